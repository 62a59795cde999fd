//! Criterion benchmarks for the incremental storage manager and queries.
//!
//! Run with: `cargo bench --bench ism_append`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tabledb::ism::IsmColumn;
use tabledb::table::ColumnDesc;
use tabledb::{CellValue, DataType, IncrementalStMan, StorageOptions, Table, TableDesc};
use tempfile::tempdir;

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("ism_append");

    for size in [1_000u64, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let dir = tempdir().unwrap();
                let cols = vec![IsmColumn::fixed("X", DataType::Int, 0i32.to_le_bytes().to_vec())];
                let options = StorageOptions::default().with_bucket_size(4096);
                let mut st = IncrementalStMan::create(&dir.path().join("ism"), cols, &options)
                    .unwrap();
                for row in 0..size {
                    st.add_rows(1).unwrap();
                    // Runs of 8 equal values.
                    st.put(0, row, &((row / 8) as i32).to_le_bytes()).unwrap();
                }
                st.close().unwrap();
            });
        });
    }

    group.finish();
}

fn bench_select_where(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let desc = TableDesc::new()
        .with_column(ColumnDesc::scalar("X", DataType::Int))
        .unwrap();
    let table = Table::create(&dir.path().join("t"), desc, StorageOptions::default()).unwrap();
    table.add_rows(10_000, true).unwrap();
    for row in 0..10_000u64 {
        table
            .put_cell("X", row, &CellValue::Int((row % 100) as i32))
            .unwrap();
    }
    let tables = [table];

    c.bench_function("select_where", |b| {
        b.iter(|| {
            tabledb::taql::execute(black_box("SELECT * WHERE X = 50"), &tables).unwrap();
        });
    });
}

criterion_group!(benches, bench_append, bench_select_where);
criterion_main!(benches);
