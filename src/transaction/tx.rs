use core::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::{common::Database, types::DbResult};

pub type TransactionID = u32;

static TRANSACTION_ID: AtomicU32 = AtomicU32::new(1);

/// A thin handle on one transaction: an identity plus commit/abort
/// entry points. All the real completion work happens in the buffer
/// pool.
#[derive(Eq, PartialEq, Hash, Clone)]
pub struct Transaction {
    // increase monotonically by 1
    id: TransactionID,
}

impl Transaction {
    /// Begin a new transaction.
    pub fn new() -> Self {
        let id = TRANSACTION_ID.fetch_add(1, Ordering::Relaxed);
        let instance = Self { id };
        instance.start().unwrap();
        instance
    }

    fn start(&self) -> DbResult {
        Database::mut_log_manager().log_start(self)
    }

    /// Flush this transaction's dirty pages and release its locks.
    pub fn commit(&self) -> DbResult {
        Database::buffer_pool().transaction_complete(self, true)
    }

    /// Discard this transaction's dirty pages and release its locks.
    pub fn abort(&self) -> DbResult {
        Database::buffer_pool().transaction_complete(self, false)
    }

    pub fn get_id(&self) -> TransactionID {
        self.id
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tx_{}", self.id)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
