//! Typed column values and their total ordering.

use std::cmp::Ordering;

/// A typed column value.
///
/// Records carry JSON-compatible values; the engine never interprets them
/// beyond comparison, null checks and equality.
pub type Value = serde_json::Value;

/// Returns the rank of a value's kind, used when comparing mixed kinds.
#[must_use]
pub fn value_kind(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Compares two values with a total order.
///
/// Numbers compare numerically (integers exactly, otherwise as `f64` with
/// `total_cmp`), strings lexically, arrays element-wise. Values of
/// different kinds order by kind: null < bool < number < string < array <
/// object. Objects compare by their serialized form.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return x.cmp(&y);
            }
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return x.cmp(&y);
            }
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ord = compare_values(left, right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => value_kind(a).cmp(&value_kind(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_compare_numerically() {
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
        assert_eq!(compare_values(&json!(1_704_067_200.0), &json!(1_704_067_200)), Ordering::Equal);
    }

    #[test]
    fn test_iso_strings_order_chronologically() {
        assert_eq!(
            compare_values(&json!("2024-01-01T10:00:00"), &json!("2024-01-02T09:00:00")),
            Ordering::Less
        );
    }

    #[test]
    fn test_mixed_kinds_order_by_kind() {
        assert_eq!(compare_values(&Value::Null, &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!("1"), &json!(1)), Ordering::Greater);
    }

    #[test]
    fn test_arrays_compare_elementwise() {
        assert_eq!(compare_values(&json!([1, "a"]), &json!([1, "b"])), Ordering::Less);
        assert_eq!(compare_values(&json!([1]), &json!([1, 0])), Ordering::Less);
    }
}
