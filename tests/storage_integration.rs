//! Integration tests for the storage managers and tables.
//!
//! These tests verify cross-component behavior that unit tests don't cover:
//! bucket eviction under a small cache, reopening from disk, and views
//! layered over a plain table.

use std::path::Path;

use proptest::prelude::*;
use tabledb::array::{Array, ArrayCell, Shape};
use tabledb::ism::IsmColumn;
use tabledb::table::ColumnDesc;
use tabledb::{
    CellValue, DataType, Error, IncrementalStMan, SortKey, StorageOptions, Table, TableDesc,
};
use tempfile::tempdir;

fn int(v: i32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

fn read_int(st: &IncrementalStMan, row: u64) -> i32 {
    let raw = st.get(0, row).unwrap();
    i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
}

fn int_store(prefix: &Path, cache_buckets: usize) -> IncrementalStMan {
    let options = StorageOptions::default()
        .with_bucket_size(128)
        .with_cache_buckets(cache_buckets);
    let cols = vec![IsmColumn::fixed("X", DataType::Int, int(0))];
    IncrementalStMan::create(prefix, cols, &options).unwrap()
}

fn x_table(dir: &Path, xs: &[i32]) -> Table {
    let desc = TableDesc::new()
        .with_column(ColumnDesc::scalar("X", DataType::Int))
        .unwrap();
    let table = Table::create(&dir.join("t"), desc, StorageOptions::default()).unwrap();
    table.add_rows(xs.len() as u64, true).unwrap();
    for (row, &x) in xs.iter().enumerate() {
        table.put_cell("X", row as u64, &CellValue::Int(x)).unwrap();
    }
    table
}

fn column(table: &Table, name: &str) -> Vec<CellValue> {
    table.get_column(name).unwrap()
}

/// Values survive buckets being evicted and read back many times.
#[test]
fn test_values_survive_evictions() {
    let dir = tempdir().unwrap();
    let mut st = int_store(&dir.path().join("ism"), 2);
    for row in 0..300u64 {
        st.add_rows(1).unwrap();
        st.put(0, row, &int(row as i32 * 7)).unwrap();
    }
    assert!(st.bucket_count() > 2);
    for row in (0..300u64).rev() {
        assert_eq!(read_int(&st, row), row as i32 * 7);
    }
    let stats = st.cache_stats();
    assert!(stats.evictions > 0);
    assert!(stats.buckets_written > 0);
    st.check().unwrap();
}

/// Flush, close and reopen with a different cache size.
#[test]
fn test_close_and_reopen() {
    let dir = tempdir().unwrap();
    let prefix = dir.path().join("ism");
    {
        let mut st = int_store(&prefix, 3);
        st.add_rows(100).unwrap();
        for row in (0..100u64).step_by(10) {
            st.put(0, row, &int(row as i32)).unwrap();
        }
        st.close().unwrap();
    }
    let st = IncrementalStMan::open(&prefix, 1).unwrap();
    assert_eq!(st.nrow(), 100);
    assert_eq!(read_int(&st, 0), 0);
    assert_eq!(read_int(&st, 19), 10);
    assert_eq!(read_int(&st, 99), 90);
    let runs = st.get_runs(0, 0, 100).unwrap();
    assert_eq!(runs.iter().map(|(n, _)| n).sum::<u64>(), 100);
    assert!(runs.len() >= 10);
}

/// The five row scenario: runs split on put, views see root rows.
#[test]
fn test_put_and_view_scenario() {
    let dir = tempdir().unwrap();
    let table = x_table(dir.path(), &[1, 1, 1, 2, 2]);
    assert_eq!(table.get_cell("X", 3).unwrap(), CellValue::Int(2));
    table.put_cell("X", 4, &CellValue::Int(3)).unwrap();
    assert_eq!(table.get_cell("X", 4).unwrap(), CellValue::Int(3));
    assert_eq!(table.get_cell("X", 3).unwrap(), CellValue::Int(2));
    assert_eq!(
        column(&table, "X"),
        [1, 1, 1, 2, 3].map(CellValue::Int).to_vec()
    );

    let view = table.select_rows(&[3, 4, 0]).unwrap();
    assert_eq!(view.nrow(), 3);
    assert_eq!(view.row_numbers(), vec![3, 4, 0]);
    assert!(!view.row_order());
    assert!(table.select_rows(&[0, 3, 4]).unwrap().row_order());
    assert_eq!(view.get_cell("X", 1).unwrap(), CellValue::Int(3));
    assert_eq!(column(&view, "X"), [2, 3, 1].map(CellValue::Int).to_vec());

    view.put_cell("X", 2, &CellValue::Int(9)).unwrap();
    assert_eq!(table.get_cell("X", 0).unwrap(), CellValue::Int(9));
    assert_eq!(table.get_cell("X", 1).unwrap(), CellValue::Int(1));
}

/// Views written to disk reopen against their root table.
#[test]
fn test_view_persistence() {
    let dir = tempdir().unwrap();
    let table = x_table(dir.path(), &[5, 3, 4, 1]);
    let sorted = table
        .sort_by(&[SortKey::ascending("X")], false)
        .unwrap();
    assert_eq!(sorted.row_numbers(), vec![3, 1, 2, 0]);
    sorted.write_view(&dir.path().join("sorted")).unwrap();
    table.flush().unwrap();
    drop(sorted);
    drop(table);

    let reopened = Table::open(&dir.path().join("sorted")).unwrap();
    assert!(reopened.is_view());
    assert_eq!(column(&reopened, "X"), [1, 3, 4, 5].map(CellValue::Int).to_vec());
}

/// Variable shaped arrays keep their shape per row.
#[test]
fn test_indirect_array_column() {
    let dir = tempdir().unwrap();
    let desc = TableDesc::new()
        .with_column(ColumnDesc::array("A", DataType::Double))
        .unwrap();
    let table = Table::create(&dir.path().join("t"), desc, StorageOptions::default()).unwrap();
    table.add_rows(3, true).unwrap();
    assert!(!table.is_defined("A", 1).unwrap());

    let a = ArrayCell::Double(Array::from_vec(vec![1.0, 2.0, 3.0, 4.0]));
    table.put_array("A", 1, &a).unwrap();
    assert_eq!(table.array_shape("A", 1).unwrap(), Some(Shape::vector(4)));
    assert_eq!(table.get_array("A", 1).unwrap(), a);
    assert!(!table.is_defined("A", 2).unwrap());
    assert!(matches!(
        table.get_array("A", 0),
        Err(Error::InvalidOperation(_))
    ));
}

/// A view forgets removed rows; removing from the root shifts the rest.
#[test]
fn test_remove_rows_view_and_root() {
    let dir = tempdir().unwrap();
    let table = x_table(dir.path(), &[10, 11, 12, 13]);
    let view = table.select_rows(&[1, 3]).unwrap();
    view.remove_rows(&[0]).unwrap();
    assert_eq!(view.row_numbers(), vec![3]);
    assert_eq!(table.nrow(), 4);

    table.remove_rows(&[1]).unwrap();
    assert_eq!(column(&table, "X"), [10, 12, 13].map(CellValue::Int).to_vec());
}

#[derive(Debug, Clone)]
enum Op {
    Add(u64),
    Put(u64, i32),
    Remove(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..5).prop_map(Op::Add),
        (any::<u64>(), -3i32..3).prop_map(|(r, v)| Op::Put(r, v)),
        any::<u64>().prop_map(Op::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The storage manager behaves like a plain vector of values.
    #[test]
    fn prop_ism_matches_vector(ops in prop::collection::vec(op(), 1..80)) {
        let dir = tempdir().unwrap();
        let mut st = int_store(&dir.path().join("ism"), 2);
        let mut model: Vec<i32> = Vec::new();
        for op in ops {
            match op {
                Op::Add(n) => {
                    let last = model.last().copied().unwrap_or(0);
                    st.add_rows(n).unwrap();
                    model.extend(std::iter::repeat(last).take(n as usize));
                }
                Op::Put(row, v) if !model.is_empty() => {
                    let row = row % model.len() as u64;
                    st.put(0, row, &int(v)).unwrap();
                    model[row as usize] = v;
                }
                Op::Remove(row) if !model.is_empty() => {
                    let row = row % model.len() as u64;
                    st.remove_row(row).unwrap();
                    model.remove(row as usize);
                }
                _ => {}
            }
        }
        prop_assert_eq!(st.nrow(), model.len() as u64);
        for (row, v) in model.iter().enumerate() {
            prop_assert_eq!(read_int(&st, row as u64), *v);
        }
        st.check().unwrap();
    }
}
