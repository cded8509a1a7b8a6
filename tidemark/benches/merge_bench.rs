//! Benchmarks for the CDC merge and batch constraint evaluation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tidemark::cdc::{apply_changes, CdcSpec, CurrentStateTable, ScdType};
use tidemark::core::Record;
use tidemark::quality::{evaluate_batch, Comparison, Constraint, Predicate};

fn changes(keys: usize, versions: usize) -> Vec<Record> {
    (0..versions)
        .rev()
        .flat_map(|seq| {
            (0..keys).map(move |k| {
                Record::new()
                    .with("customer_id", format!("C{k:06}"))
                    .with("city", format!("City {}", (k + seq) % 50))
                    .with("operation", if seq == 0 { "INSERT" } else { "UPDATE" })
                    .with("sequence_num", seq as i64)
            })
        })
        .collect()
}

fn merge_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_changes");
    for scd_type in [ScdType::Type1, ScdType::Type2] {
        let spec = CdcSpec::new(["customer_id"], "sequence_num").with_scd_type(scd_type);
        let state = CurrentStateTable::new(scd_type);
        let batch = changes(10_000, 3);
        group.bench_with_input(BenchmarkId::from_parameter(scd_type), &batch, |b, batch| {
            b.iter(|| apply_changes(black_box(&state), batch.clone(), &spec, "customers"));
        });
    }
    group.finish();
}

fn constraint_benchmark(c: &mut Criterion) {
    let constraints = vec![
        Constraint::drop_row("valid_id", Predicate::not_null("customer_id")),
        Constraint::expect("valid_sequence", Predicate::compare("sequence_num", Comparison::Ge, 0)),
    ];
    let batch = changes(10_000, 1);
    c.bench_function("evaluate_batch", |b| {
        b.iter(|| evaluate_batch(black_box(batch.clone()), &constraints));
    });
}

criterion_group!(benches, merge_benchmark, constraint_benchmark);
criterion_main!(benches);
