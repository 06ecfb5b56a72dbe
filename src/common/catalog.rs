use std::{collections::HashMap, sync::Arc};

use crate::storage::schema::Schema;
use crate::storage::table::DbFile;

/// Registry of every table file the engine can serve, keyed by table
/// id.
pub struct Catalog {
    tables: HashMap<u32, Arc<dyn DbFile>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Register the table under its own id. Re-adding a table replaces
    /// the previous entry.
    pub fn add_table(&mut self, table: Arc<dyn DbFile>) {
        self.tables.insert(table.get_id(), table);
    }

    pub fn get_table(&self, table_id: &u32) -> Option<Arc<dyn DbFile>> {
        self.tables.get(table_id).map(Arc::clone)
    }

    pub fn get_schema(&self, table_id: &u32) -> Option<Schema> {
        self.tables
            .get(table_id)
            .map(|table| table.get_schema().clone())
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}
