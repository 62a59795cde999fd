//! End-to-end query tests.
//!
//! Each test builds a small table on disk and runs statements through
//! `execute`, checking results against the stored rows.

use std::path::Path;

use tabledb::array::ArrayCell;
use tabledb::table::ColumnDesc;
use tabledb::taql::{execute, parse, restore, save, QueryResult, Scalar, Value};
use tabledb::{CellValue, DataType, StorageOptions, Table, TableDesc};
use tempfile::tempdir;

fn create_table(dir: &Path) -> Table {
    let desc = TableDesc::new()
        .with_column(ColumnDesc::scalar("X", DataType::Int))
        .unwrap()
        .with_column(ColumnDesc::scalar("NAME", DataType::String))
        .unwrap();
    let table = Table::create(&dir.join("t"), desc, StorageOptions::default()).unwrap();
    table.add_rows(5, true).unwrap();
    for (row, (x, name)) in [(1, "a"), (1, "b"), (1, "c"), (2, "d"), (3, "e")]
        .into_iter()
        .enumerate()
    {
        table.put_cell("X", row as u64, &CellValue::Int(x)).unwrap();
        table
            .put_cell("NAME", row as u64, &CellValue::String(name.into()))
            .unwrap();
    }
    table
}

fn ints(table: &Table, name: &str) -> Vec<i64> {
    table
        .get_column(name)
        .unwrap()
        .iter()
        .map(|c| c.as_i64().unwrap())
        .collect()
}

#[test]
fn test_where_order_limit_scenario() {
    let dir = tempdir().unwrap();
    let t = create_table(dir.path());
    let view = execute("SELECT * WHERE X > 1 ORDERBY X DESC LIMIT 2", &[t])
        .unwrap()
        .into_table()
        .unwrap();
    assert_eq!(view.row_numbers(), vec![4, 3]);
    assert_eq!(ints(&view, "X"), vec![3, 2]);
}

/// `X = [1,1,1,2,2]`: the two rows above 1 tie, and the stable sort keeps
/// them in table order.
#[test]
fn test_where_order_limit_on_tied_keys() {
    let dir = tempdir().unwrap();
    let desc = TableDesc::new()
        .with_column(ColumnDesc::scalar("X", DataType::Int))
        .unwrap();
    let t = Table::create(&dir.path().join("ties"), desc, StorageOptions::default()).unwrap();
    t.add_rows(5, true).unwrap();
    for (row, x) in [1, 1, 1, 2, 2].into_iter().enumerate() {
        t.put_cell("X", row as u64, &CellValue::Int(x)).unwrap();
    }
    let view = execute("SELECT * WHERE X > 1 ORDERBY X DESC LIMIT 2", &[t])
        .unwrap()
        .into_table()
        .unwrap();
    assert_eq!(view.row_numbers(), vec![3, 4]);
    assert_eq!(ints(&view, "X"), vec![2, 2]);
}

#[test]
fn test_in_range_selection() {
    let dir = tempdir().unwrap();
    let t = create_table(dir.path());
    let rows = execute("SELECT * WHERE X IN [1:3]", &[t.clone()])
        .unwrap()
        .into_table()
        .unwrap();
    assert_eq!(rows.row_numbers(), vec![0, 1, 2, 3]);
    let rows = execute("SELECT * WHERE X IN [2:4:1]", &[t])
        .unwrap()
        .into_table()
        .unwrap();
    assert_eq!(rows.row_numbers(), vec![3, 4]);
}

#[test]
fn test_nested_from_query() {
    let dir = tempdir().unwrap();
    let t = create_table(dir.path());
    let view = execute(
        "SELECT NAME FROM (SELECT * FROM $1 WHERE X < 3) WHERE NAME != 'a'",
        &[t],
    )
    .unwrap()
    .into_table()
    .unwrap();
    assert_eq!(view.row_numbers(), vec![1, 2, 3]);
    assert_eq!(view.desc().column_names(), vec!["NAME".to_string()]);
}

#[test]
fn test_giving_new_table_and_query_by_path() {
    let dir = tempdir().unwrap();
    let t = create_table(dir.path());
    let out = dir.path().join("doubled");
    let text = format!(
        "SELECT X * 2 AS Y FROM $1 WHERE X > 1 GIVING '{}'",
        out.display()
    );
    let created = execute(&text, &[t]).unwrap().into_table().unwrap();
    assert!(!created.is_view());
    assert_eq!(ints(&created, "Y"), vec![4, 6]);
    drop(created);

    let reopened = Table::open(&out).unwrap();
    assert_eq!(reopened.nrow(), 2);
    let text = format!("SELECT * FROM '{}' WHERE Y > 5", out.display());
    let rows = execute(&text, &[]).unwrap();
    assert_eq!(rows.nrow(), 1);
}

#[test]
fn test_array_column_update_and_reduce() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("arr");
    let text = format!("CREATE TABLE '{}' B R8 [SHAPE=[2,2]] LIMIT 2", path.display());
    let t = execute(&text, &[]).unwrap().into_table().unwrap();
    execute("UPDATE $1 SET B[0,1] = 5", &[t.clone()]).unwrap();
    match t.get_array("B", 1).unwrap() {
        ArrayCell::Double(a) => {
            assert_eq!(*a.get(&[0, 1]).unwrap(), 5.0);
            assert_eq!(*a.get(&[1, 0]).unwrap(), 0.0);
        }
        other => panic!("unexpected {other:?}"),
    }

    let rows = execute("SELECT sum(B) AS S FROM $1", &[t])
        .unwrap()
        .into_rows()
        .unwrap();
    assert_eq!(rows.nrow(), 2);
    assert_eq!(
        rows.column("S").unwrap()[0],
        Value::Scalar(Scalar::Double(5.0))
    );
}

#[test]
fn test_group_having_order() {
    let dir = tempdir().unwrap();
    let t = create_table(dir.path());
    let rows = execute(
        "SELECT X, gcount() AS N FROM $1 GROUPBY X HAVING gcount() < 3 ORDERBY X DESC",
        &[t],
    )
    .unwrap()
    .into_rows()
    .unwrap();
    assert_eq!(rows.nrow(), 2);
    assert_eq!(
        rows.column("X").unwrap(),
        &[Value::Scalar(Scalar::Int(3)), Value::Scalar(Scalar::Int(2))]
    );
}

#[test]
fn test_drop_table() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gone");
    let text = format!("CREATE TABLE '{}' A I4", path.display());
    drop(execute(&text, &[]).unwrap());
    assert!(path.exists());
    let result = execute(&format!("DROP TABLE '{}'", path.display()), &[]).unwrap();
    assert!(matches!(result, QueryResult::Done));
    assert!(!path.exists());
}

#[test]
fn test_show_reparses_and_persists() {
    for text in [
        "SELECT * FROM $1 WHERE X > 1 ORDERBY X DESC LIMIT 2",
        "SELECT NAME AS N FROM $1 WHERE X IN [1, 3] GIVING '/tmp/out'",
        "UPDATE $1 SET X = X * 10 WHERE NAME = 'a'",
        "INSERT INTO $1 (X, NAME) VALUES (7, 'f')",
        "DELETE FROM $1 WHERE X < 3",
        "CALC sum([1, 2, 3]) + 1",
        "CALC [1, 2, 3, 4, 5][-2:]",
        "SELECT * FROM $1 WHERE X IN [1:3, 10:20:5]",
        "CREATE TABLE '/tmp/t' A I4 DMINFO [NAME='x', TYPE='IncrementalStMan', SPEC=[BUCKETSIZE=1000]]",
    ] {
        let node = parse(text).unwrap();
        let shown = node.show();
        let again = parse(&shown).unwrap();
        assert_eq!(again.show(), shown, "reparse of {text}");
        assert_eq!(restore(&save(&node)).unwrap(), node, "restore of {text}");
    }
}
