use std::{
    mem,
    path::PathBuf,
    sync::{Arc, Once, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    common::Catalog, storage::buffer_pool::BufferPool, tx_log::LogManager, types::Pod,
    utils::HandyRwLock,
};

/// We collect all global state here. These members cannot be plain
/// statics since their constructors are not const, and the buffer pool
/// must stay directly reachable (its lock manager blocks callers, so
/// it cannot live behind an exclusive outer lock).
pub struct Database {
    path: PathBuf,

    buffer_pool: BufferPool,
    catalog: Pod<Catalog>,
    log_manager: Pod<LogManager>,
}

static mut SINGLETON: *mut Database = 0 as *mut Database;
static INIT: Once = Once::new();

impl Database {
    fn new() -> Self {
        let db_path = PathBuf::from("data");
        if !db_path.exists() {
            std::fs::create_dir_all(&db_path).expect("io error");
        }

        let log_path = db_path.join("wal.log");

        Self {
            path: db_path,
            buffer_pool: BufferPool::new(),
            catalog: Arc::new(RwLock::new(Catalog::new())),
            log_manager: Arc::new(RwLock::new(LogManager::new(log_path))),
        }
    }

    pub fn global() -> &'static Self {
        INIT.call_once(|| {
            let singleton = Self::new();

            unsafe {
                // Put it in the heap so it can outlive this call.
                SINGLETON = mem::transmute(Box::new(singleton));
            }
        });

        unsafe { SINGLETON.as_ref().unwrap() }
    }

    /// Reset the in-memory state of the database, used mostly by
    /// tests. The buffer pool is recreated with the current size
    /// settings, the catalog is emptied and the log file is truncated.
    pub fn reset() {
        // One-time init must have run already, so the swap below
        // replaces a live instance and never races the lazy path.
        Self::global();

        let singleton = Self::new();

        unsafe {
            // Drop the previous instance.
            mem::drop(Box::from_raw(SINGLETON));

            // Put it in the heap so it can outlive this call.
            SINGLETON = mem::transmute(Box::new(singleton));
        }
    }

    pub fn buffer_pool() -> &'static BufferPool {
        &Self::global().buffer_pool
    }

    pub fn catalog() -> RwLockReadGuard<'static, Catalog> {
        Self::global().catalog.rl()
    }

    pub fn mut_catalog() -> RwLockWriteGuard<'static, Catalog> {
        Self::global().catalog.wl()
    }

    pub fn log_manager() -> RwLockReadGuard<'static, LogManager> {
        Self::global().log_manager.rl()
    }

    pub fn mut_log_manager() -> RwLockWriteGuard<'static, LogManager> {
        Self::global().log_manager.wl()
    }

    /// Directory holding the write-ahead log, handy for placing table
    /// files next to it.
    pub fn path() -> PathBuf {
        Self::global().path.clone()
    }
}
