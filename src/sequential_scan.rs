use crate::{
    error::DbError, storage::table::HeapTableIterator, storage::tuple::Tuple,
    transaction::Transaction,
};

/// Scan operator reading every row of a table in page and slot order
/// on behalf of one transaction.
pub struct SequentialScan {
    pub table_id: u32,
    pub table_alias: String,
    iter: HeapTableIterator,
}

impl SequentialScan {
    pub fn new(tx: &Transaction, table_id: u32, table_alias: &str) -> SequentialScan {
        SequentialScan {
            table_id,
            table_alias: table_alias.to_string(),
            iter: HeapTableIterator::new(tx, table_id),
        }
    }

    pub fn rewind(&mut self) {
        self.iter.rewind();
    }

    pub fn has_next(&mut self) -> bool {
        self.iter.has_next()
    }

    /// Fallible fetch, propagating lock timeouts and I/O failures.
    pub fn try_next(&mut self) -> Result<Option<Tuple>, DbError> {
        self.iter.try_next()
    }

    pub fn close(&mut self) {
        self.iter.close();
    }
}

impl Iterator for SequentialScan {
    type Item = Tuple;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}
