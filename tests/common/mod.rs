use std::sync::{Arc, Mutex, MutexGuard};

use heap_db::{
    small_int_schema,
    storage::buffer_pool::{BufferPool, DEFAULT_PAGE_SIZE, DEFAULT_POOL_SIZE},
    storage::tuple::{Cell, Tuple},
    transaction::Transaction,
    types::DbResult,
    utils, Database, DbFile, HeapTable,
};
use lazy_static::lazy_static;
use rand::prelude::*;

lazy_static! {
    // The database is a process-wide singleton, tests sharing it run
    // one at a time.
    static ref TEST_MUTEX: Mutex<()> = Mutex::new(());
}

/// # Conduct the initialization
///
/// - Setting up log configurations.
/// - Reset page size and pool size.
/// - Reset the database (fresh buffer pool, empty catalog, truncated
///   log).
///
/// The returned guard serializes the calling test against every other
/// test in the binary.
pub fn setup() -> MutexGuard<'static, ()> {
    setup_with_pool_size(DEFAULT_POOL_SIZE)
}

pub fn setup_with_pool_size(pool_size: usize) -> MutexGuard<'static, ()> {
    let guard = TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    utils::init_log();
    BufferPool::set_page_size(DEFAULT_PAGE_SIZE);
    BufferPool::set_pool_size(pool_size);
    Database::reset();

    guard
}

/// Create an empty table backed by a fresh file under the data
/// directory and register it with the catalog.
pub fn new_empty_heap_table(file_name: &str, columns: usize) -> Arc<HeapTable> {
    let path = Database::path().join(file_name);
    // start clean even when a previous run left a file behind
    let _ = std::fs::remove_file(&path);

    let table = Arc::new(HeapTable::new(&path, small_int_schema(columns, "")));
    Database::mut_catalog().add_table(Arc::clone(&table) as Arc<dyn DbFile>);
    table
}

/// Create a table filled with `rows` random rows, committed by a
/// single transaction. The generated rows are appended to `cells` in
/// insertion (and therefore scan) order.
pub fn create_random_heap_table(
    file_name: &str,
    columns: usize,
    rows: usize,
    cells: &mut Vec<Vec<i32>>,
) -> Arc<HeapTable> {
    let table = new_empty_heap_table(file_name, columns);
    let mut rng = rand::thread_rng();

    let tx = Transaction::new();
    for _ in 0..rows {
        let row: Vec<i32> = (0..columns)
            .map(|_| rng.gen_range(i32::MIN, i32::MAX))
            .collect();
        insert_row(&table, &tx, &row).unwrap();
        cells.push(row);
    }
    tx.commit().unwrap();

    table
}

pub fn insert_row(table: &HeapTable, tx: &Transaction, row: &[i32]) -> DbResult {
    let cells = row.iter().map(|v| Cell::Int(*v)).collect();
    let mut tuple = Tuple::new(table.get_schema(), cells)?;
    Database::buffer_pool().insert_tuple(tx, table.get_id(), &mut tuple)
}

/// Every int cell of every row, in scan order.
pub fn scan_int_rows(table: &HeapTable, tx: &Transaction) -> Vec<Vec<i32>> {
    table
        .iter(tx)
        .map(|tuple| {
            (0..table.get_schema().get_field_count())
                .map(|i| match tuple.get_cell(i) {
                    Cell::Int(v) => v,
                    cell => panic!("unexpected cell {}", cell),
                })
                .collect()
        })
        .collect()
}
