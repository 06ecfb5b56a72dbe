use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, RwLock,
    },
};

use log::{debug, info};

use crate::{
    common::Database,
    error::DbError,
    storage::page::{HeapPage, HeapPageId},
    storage::table::DbFile,
    storage::tuple::Tuple,
    transaction::{LockManager, Permission, Transaction},
    types::{DbResult, Pod, ResultPod},
    utils::HandyRwLock,
};

pub const DEFAULT_PAGE_SIZE: usize = 4096;
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

pub const DEFAULT_POOL_SIZE: usize = 50;
static POOL_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_POOL_SIZE);

struct PageStore {
    pages: HashMap<HeapPageId, Pod<HeapPage>>,

    // most recently used first
    access_order: VecDeque<HeapPageId>,
}

impl PageStore {
    fn new() -> Self {
        Self {
            pages: HashMap::new(),
            access_order: VecDeque::new(),
        }
    }

    fn touch(&mut self, pid: &HeapPageId) {
        self.access_order.retain(|p| p != pid);
        self.access_order.push_front(*pid);
    }

    fn install(&mut self, pid: HeapPageId, page: Pod<HeapPage>) {
        self.pages.insert(pid, page);
        self.access_order.push_front(pid);
    }

    fn remove(&mut self, pid: &HeapPageId) {
        self.pages.remove(pid);
        self.access_order.retain(|p| p != pid);
    }
}

/// Capacity-bounded cache of heap pages, and the place where
/// transactions complete.
///
/// Every page request goes through the lock manager first, so the
/// per-page locks carry the real concurrency; the resident map and its
/// access order are serialized under one internal mutex. Lock order:
/// store mutex before page lock; no page lock may be held when asking
/// for the store mutex.
///
/// Eviction is NO STEAL: a page dirtied by an uncommitted transaction
/// never leaves the pool, so disk always holds committed images only.
pub struct BufferPool {
    pool_size: usize,
    store: Mutex<PageStore>,
    lock_manager: LockManager,
}

impl BufferPool {
    /// A pool sized by the current `set_pool_size` setting. Capacity is
    /// fixed for the lifetime of the pool.
    pub fn new() -> Self {
        Self {
            pool_size: Self::get_pool_size(),
            store: Mutex::new(PageStore::new()),
            lock_manager: LockManager::new(),
        }
    }

    pub fn set_page_size(page_size: usize) {
        PAGE_SIZE.store(page_size, Ordering::Relaxed);
        info!("page size set to {}", page_size);
    }

    pub fn get_page_size() -> usize {
        PAGE_SIZE.load(Ordering::Relaxed)
    }

    /// Capacity applied to pools created afterwards.
    pub fn set_pool_size(pool_size: usize) {
        POOL_SIZE.store(pool_size, Ordering::Relaxed);
        info!("pool size set to {}", pool_size);
    }

    pub fn get_pool_size() -> usize {
        POOL_SIZE.load(Ordering::Relaxed)
    }

    fn lookup_table(table_id: u32) -> Result<Arc<dyn DbFile>, DbError> {
        Database::catalog()
            .get_table(&table_id)
            .ok_or_else(|| DbError::new(&format!("table {} not found", table_id)))
    }

    /// Retrieve the page with the given permission. The matching lock
    /// is acquired first and may block, or abort the transaction on
    /// timeout. A miss reads the page through the catalog's file,
    /// evicting the least recently used clean page when the pool is
    /// full.
    pub fn get_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &HeapPageId,
    ) -> ResultPod<HeapPage> {
        self.lock_manager.acquire_lock(tx, &perm.to_lock(), pid)?;

        let mut store = self.store.lock().unwrap();

        if let Some(page_pod) = store.pages.get(pid) {
            let page_pod = Arc::clone(page_pod);
            store.touch(pid);
            return Ok(page_pod);
        }

        if store.pages.len() >= self.pool_size {
            Self::evict_page(&mut store)?;
        }

        let table = Self::lookup_table(pid.get_table_id())?;
        let page = table.read_page(pid)?;
        let page_pod = Arc::new(RwLock::new(page));
        store.install(*pid, Arc::clone(&page_pod));
        Ok(page_pod)
    }

    /// Drop the least recently used clean page. With every resident
    /// page dirty there is nothing safe to drop, and the caller's
    /// request fails.
    fn evict_page(store: &mut PageStore) -> DbResult {
        let victim = store.access_order.iter().rev().copied().find(|pid| {
            store
                .pages
                .get(pid)
                .map(|p| p.rl().dirtied_by().is_none())
                .unwrap_or(false)
        });

        match victim {
            Some(pid) => {
                debug!("evicting page {}", pid);
                store.remove(&pid);
                Ok(())
            }
            None => Err(DbError::new("evict failed")),
        }
    }

    /// Insert the tuple into the table on behalf of the transaction.
    /// Mutated pages are marked dirty and kept resident.
    pub fn insert_tuple(&self, tx: &Transaction, table_id: u32, tuple: &mut Tuple) -> DbResult {
        let table = Self::lookup_table(table_id)?;
        let dirtied = table.insert_tuple(tx, tuple)?;
        self.finish_mutation(tx, dirtied)
    }

    /// Delete the tuple from the table owning it, resolved through the
    /// tuple's record id.
    pub fn delete_tuple(&self, tx: &Transaction, tuple: &Tuple) -> DbResult {
        let rid = tuple
            .get_record_id()
            .ok_or_else(|| DbError::new("tuple has no record id"))?;
        let table = Self::lookup_table(rid.get_page_id().get_table_id())?;
        let dirtied = table.delete_tuple(tx, tuple)?;
        self.finish_mutation(tx, dirtied)
    }

    fn finish_mutation(&self, tx: &Transaction, dirtied: Vec<Pod<HeapPage>>) -> DbResult {
        for page_pod in dirtied {
            let pid = {
                let mut page = page_pod.wl();
                page.mark_dirty(Some(tx.get_id()));
                page.get_pid()
            };

            let mut store = self.store.lock().unwrap();
            if store.pages.contains_key(&pid) {
                store.touch(&pid);
            } else {
                if store.pages.len() >= self.pool_size {
                    Self::evict_page(&mut store)?;
                }
                store.install(pid, Arc::clone(&page_pod));
            }
        }
        Ok(())
    }

    pub fn holds_lock(&self, tx: &Transaction, pid: &HeapPageId) -> bool {
        self.lock_manager.holds_lock(tx, pid)
    }

    /// Release both lock modes on the page regardless of transaction
    /// state. Meant for recovery paths and tests only; everything else
    /// holds its locks until completion.
    pub fn unsafe_release_page(&self, tx: &Transaction, pid: &HeapPageId) {
        self.lock_manager.release_page(tx, pid);
    }

    /// Commit or roll back: flush (commit) or discard (abort) every
    /// resident page the transaction dirtied, log the outcome, and
    /// release all of its locks.
    pub fn transaction_complete(&self, tx: &Transaction, commit: bool) -> DbResult {
        debug!("{} completes, commit: {}", tx, commit);

        // snapshot first, flushing mutates the cache
        for pid in self.pages_dirtied_by(tx) {
            if commit {
                self.flush_page(&pid)?;
            } else {
                self.discard_page(&pid);
            }
        }

        {
            let mut log_manager = Database::mut_log_manager();
            if commit {
                log_manager.log_commit(tx)?;
            } else {
                log_manager.log_abort(tx)?;
            }
        }

        for pid in self.lock_manager.pages_held_by(tx) {
            self.lock_manager.release_page(tx, &pid);
        }
        Ok(())
    }

    fn pages_dirtied_by(&self, tx: &Transaction) -> Vec<HeapPageId> {
        let store = self.store.lock().unwrap();
        store
            .pages
            .iter()
            .filter(|(_, page_pod)| page_pod.rl().dirtied_by() == Some(tx.get_id()))
            .map(|(pid, _)| *pid)
            .collect()
    }

    /// Write one dirty page out: UPDATE record first, force the log,
    /// then the page itself, then drop the cache entry and refresh the
    /// before-image. Clean pages are left untouched.
    fn flush_page(&self, pid: &HeapPageId) -> DbResult {
        let mut store = self.store.lock().unwrap();
        let page_pod = match store.pages.get(pid) {
            Some(p) => Arc::clone(p),
            None => return Ok(()),
        };

        let mut page = page_pod.wl();
        let tid = match page.dirtied_by() {
            Some(tid) => tid,
            None => return Ok(()),
        };

        {
            let mut log_manager = Database::mut_log_manager();
            log_manager.log_update(
                tid,
                pid,
                &page.get_before_image_data(),
                &page.get_page_data(),
            )?;
            log_manager.force()?;
        }

        let table = Self::lookup_table(pid.get_table_id())?;
        table.write_page(&page)?;
        debug!("page {} flushed for tx_{}", pid, tid);

        store.remove(pid);
        page.mark_dirty(None);
        page.set_before_image();
        Ok(())
    }

    /// Write all pages dirtied by the transaction to disk.
    pub fn flush_pages(&self, tx: &Transaction) -> DbResult {
        for pid in self.pages_dirtied_by(tx) {
            self.flush_page(&pid)?;
        }
        Ok(())
    }

    /// Flush every dirty page in the pool.
    ///
    /// NB: be careful using this routine -- it writes dirty data to
    /// disk, which breaks NO STEAL when uncommitted transactions are
    /// around.
    pub fn flush_all_pages(&self) -> DbResult {
        let pids: Vec<HeapPageId> = {
            let store = self.store.lock().unwrap();
            store.pages.keys().copied().collect()
        };
        for pid in pids {
            self.flush_page(&pid)?;
        }
        Ok(())
    }

    /// Drop the cache entry without writing anything.
    pub fn discard_page(&self, pid: &HeapPageId) {
        let mut store = self.store.lock().unwrap();
        store.remove(pid);
    }

    pub fn clear(&self) {
        let mut store = self.store.lock().unwrap();
        store.pages.clear();
        store.access_order.clear();
    }

    /// Resident page ids, most recently used first.
    pub fn resident_page_ids(&self) -> Vec<HeapPageId> {
        let store = self.store.lock().unwrap();
        store.access_order.iter().copied().collect()
    }
}
