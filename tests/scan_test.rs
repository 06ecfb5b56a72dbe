use heap_db::{
    sequential_scan::SequentialScan,
    storage::tuple::Cell,
    transaction::Transaction,
    Database, DbFile, ErrorKind,
};
use log::info;

mod common;

use common::{create_random_heap_table, insert_row, new_empty_heap_table, scan_int_rows, setup};

#[test]
// Insert two rows, commit, and scan them back with a new transaction
// in insertion order.
fn test_insert_and_scan() {
    let _guard = setup();

    let table = new_empty_heap_table("scan.db", 1);

    let tx = Transaction::new();
    insert_row(&table, &tx, &[7]).unwrap();
    insert_row(&table, &tx, &[11]).unwrap();
    tx.commit().unwrap();

    let scan_tx = Transaction::new();
    let scan = SequentialScan::new(&scan_tx, table.get_id(), "t");
    let values: Vec<i32> = scan
        .map(|tuple| match tuple.get_cell(0) {
            Cell::Int(v) => v,
            cell => panic!("unexpected cell {}", cell),
        })
        .collect();
    assert_eq!(values, vec![7, 11]);
    scan_tx.commit().unwrap();
}

#[test]
fn test_scan_small() {
    let column_sizes = [1, 2, 3];
    let row_sizes = [0, 1, 2, 511, 512, 1024];

    for columns in &column_sizes {
        for rows in &row_sizes {
            validate_scan(*columns, *rows);
        }
    }
}

fn validate_scan(columns: usize, rows: usize) {
    let _guard = setup();
    info!("start validate scan, columns: {}, rows: {}", columns, rows);

    let mut cells: Vec<Vec<i32>> = Vec::new();
    let table = create_random_heap_table("scan_small.db", columns, rows, &mut cells);

    let tx = Transaction::new();
    let actual = scan_int_rows(&table, &tx);
    assert_eq!(actual, cells);
    tx.commit().unwrap();
}

#[test]
// Test that rewinding a scan works.
fn test_rewind() {
    let _guard = setup();

    let mut cells: Vec<Vec<i32>> = Vec::new();
    let table = create_random_heap_table("rewind.db", 2, 1000, &mut cells);

    let tx = Transaction::new();
    let mut scan = SequentialScan::new(&tx, table.get_id(), "t");

    let mut row_index = 0;
    for tuple in scan.by_ref() {
        assert!(tuple.equal_cells(&cells[row_index]));
        row_index += 1;
        if row_index >= 100 {
            break;
        }
    }

    scan.rewind();

    let mut row_index = 0;
    for tuple in scan.by_ref() {
        assert!(tuple.equal_cells(&cells[row_index]));
        row_index += 1;
    }
    assert_eq!(row_index, cells.len());

    tx.commit().unwrap();
}

#[test]
// `has_next` answers the same until `next` advances, and `next`
// works without a preceding `has_next`.
fn test_iterator_contract() {
    let _guard = setup();

    let mut cells: Vec<Vec<i32>> = Vec::new();
    let table = create_random_heap_table("contract.db", 1, 2, &mut cells);

    let tx = Transaction::new();
    let mut iter = table.iter(&tx);

    assert!(iter.has_next());
    assert!(iter.has_next());
    let first = iter.next().unwrap();
    assert!(first.equal_cells(&cells[0]));
    // record ids point at the physical location
    let rid = first.get_record_id().unwrap();
    assert_eq!(rid.get_page_id().get_table_id(), table.get_id());
    assert_eq!(rid.get_slot(), 0);

    // next without has_next still yields the row
    let second = iter.next().unwrap();
    assert!(second.equal_cells(&cells[1]));

    assert!(!iter.has_next());
    assert!(iter.next().is_none());
    assert!(iter.try_next().unwrap().is_none());

    iter.rewind();
    assert!(iter.has_next());

    iter.close();
    assert!(!iter.has_next());
    assert!(iter.next().is_none());
    // the fallible entry point reports the misuse
    let err = iter.try_next().unwrap_err();
    assert_eq!(err.get_kind(), ErrorKind::NoElement);

    tx.commit().unwrap();
}

#[test]
// A second scan of the same table is served from the cache and sees
// identical rows.
fn test_scan_twice() {
    let _guard = setup();

    let mut cells: Vec<Vec<i32>> = Vec::new();
    let table = create_random_heap_table("cache.db", 1, 3000, &mut cells);

    let tx = Transaction::new();
    assert_eq!(scan_int_rows(&table, &tx), cells);
    assert_eq!(scan_int_rows(&table, &tx), cells);
    tx.commit().unwrap();
}

#[test]
// Deleted rows disappear from the scan; the freed slot is reused by
// the next insert.
fn test_delete_and_rescan() {
    let _guard = setup();

    let mut cells: Vec<Vec<i32>> = Vec::new();
    let table = create_random_heap_table("delete.db", 1, 10, &mut cells);

    let tx = Transaction::new();
    let victim = table.iter(&tx).nth(4).unwrap();
    Database::buffer_pool().delete_tuple(&tx, &victim).unwrap();
    tx.commit().unwrap();

    let tx = Transaction::new();
    assert_eq!(table.iter(&tx).count(), 9);

    insert_row(&table, &tx, &[12345]).unwrap();
    let rows = scan_int_rows(&table, &tx);
    // the new row landed in the recycled slot
    assert_eq!(rows[4], vec![12345]);
    assert_eq!(rows.len(), 10);
    tx.commit().unwrap();
}
