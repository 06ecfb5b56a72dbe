pub mod common;
pub mod error;
pub mod sequential_scan;
pub mod storage;
pub mod transaction;
pub mod tx_log;
pub mod types;
pub mod utils;

pub use common::{Catalog, Database};
pub use error::{DbError, ErrorKind};
pub use storage::buffer_pool::BufferPool;
pub use storage::schema::{small_int_schema, FieldItem, Schema, Type};
pub use storage::table::{DbFile, HeapTable};
