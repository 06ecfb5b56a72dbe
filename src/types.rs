use std::sync::{Arc, RwLock};

use crate::error::DbError;

// Type alias, not a new type, so the underlying Arc/RwLock methods stay
// available.
pub type Pod<T> = Arc<RwLock<T>>;

pub type ResultPod<T> = Result<Pod<T>, DbError>;
pub type DbResult = Result<(), DbError>;
