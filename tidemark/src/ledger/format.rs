//! Decoding of source file bytes into records.

use crate::core::{Record, Value};
use crate::errors::TidemarkError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The encoding of files at a source location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// One JSON object per line. Blank lines are ignored.
    #[default]
    JsonLines,
    /// A single JSON array of objects, or a single object.
    Json,
}

impl FileFormat {
    /// Returns true if a file with this identity should be read.
    #[must_use]
    pub fn accepts(&self, identity: &str) -> bool {
        let extension = identity.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        match (self, extension.as_deref()) {
            (Self::JsonLines, Some("json" | "jsonl" | "ndjson")) => true,
            (Self::Json, Some("json")) => true,
            _ => false,
        }
    }

    /// Decodes file bytes into records.
    ///
    /// # Errors
    ///
    /// Returns `TidemarkError::Decode` naming the file (and line for
    /// JSON lines) when the content is not valid for the format.
    pub fn decode(&self, identity: &str, bytes: &[u8]) -> Result<Vec<Record>, TidemarkError> {
        let decode_error = |reason: String| TidemarkError::Decode {
            file: identity.to_string(),
            reason,
        };
        let text = std::str::from_utf8(bytes).map_err(|e| decode_error(e.to_string()))?;

        match self {
            Self::JsonLines => text
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(idx, line)| {
                    let value: Value = serde_json::from_str(line)
                        .map_err(|e| decode_error(format!("line {}: {e}", idx + 1)))?;
                    Record::from_json(value)
                        .ok_or_else(|| decode_error(format!("line {}: expected a JSON object", idx + 1)))
                })
                .collect(),
            Self::Json => match serde_json::from_str(text).map_err(|e| decode_error(e.to_string()))? {
                Value::Array(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(idx, item)| {
                        Record::from_json(item)
                            .ok_or_else(|| decode_error(format!("element {idx}: expected a JSON object")))
                    })
                    .collect(),
                Value::Object(columns) => Ok(vec![Record::from_columns(columns)]),
                _ => Err(decode_error("expected a JSON array or object".to_string())),
            },
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JsonLines => write!(f, "json_lines"),
            Self::Json => write!(f, "json"),
        }
    }
}
