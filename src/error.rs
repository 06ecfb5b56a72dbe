use std::{error::Error, fmt, io};

use backtrace::Backtrace;

/// Failure categories of the storage kernel.
///
/// `TransactionAborted` is the deadlock-avoidance signal raised by a
/// timed-out lock wait; the caller is expected to abort the transaction
/// and may retry it at its own discretion. Everything else is a plain
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Db,
    TransactionAborted,
    Io,
    NoElement,
}

pub struct DbError {
    kind: ErrorKind,
    details: String,
    backtrace: Backtrace,
}

impl DbError {
    pub fn new(msg: &str) -> Self {
        Self::with_kind(ErrorKind::Db, msg)
    }

    pub fn aborted(msg: &str) -> Self {
        Self::with_kind(ErrorKind::TransactionAborted, msg)
    }

    pub fn no_element(msg: &str) -> Self {
        Self::with_kind(ErrorKind::NoElement, msg)
    }

    fn with_kind(kind: ErrorKind, msg: &str) -> Self {
        Self {
            kind,
            details: msg.to_string(),
            backtrace: Backtrace::new_unresolved(),
        }
    }

    pub fn get_kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_aborted(&self) -> bool {
        self.kind == ErrorKind::TransactionAborted
    }

    pub fn show_backtrace(&self) {
        let mut backtrace = self.backtrace.clone();
        backtrace.resolve();
        log::error!("{}\n{:?}", self.details, backtrace);
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.details)
    }
}

impl fmt::Debug for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Error for DbError {}

impl From<io::Error> for DbError {
    fn from(e: io::Error) -> Self {
        Self::with_kind(ErrorKind::Io, &e.to_string())
    }
}
