use std::{
    collections::{HashMap, HashSet},
    sync::{Condvar, Mutex},
    time::{Duration, Instant},
};

use log::debug;
use rand::Rng;

use crate::{
    error::DbError,
    storage::page::HeapPageId,
    transaction::{Transaction, TransactionID},
    types::DbResult,
};

// bounds of the per-wait budget in milliseconds, drawn uniformly
const MIN_WAIT_MS: u64 = 1000;
const MAX_WAIT_MS: u64 = 2000;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Lock {
    SLock,
    XLock,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    pub fn to_lock(&self) -> Lock {
        match self {
            Permission::ReadOnly => Lock::SLock,
            Permission::ReadWrite => Lock::XLock,
        }
    }
}

#[derive(Default)]
struct LockTable {
    s_holders: HashMap<HeapPageId, HashSet<TransactionID>>,

    // at most one exclusive holder per page
    x_holders: HashMap<HeapPageId, TransactionID>,

    waiters: Vec<TransactionID>,
}

impl LockTable {
    /// Install the lock when the request is compatible with the
    /// current holders. Returns false when the caller has to wait.
    ///
    /// A shared request passes unless another transaction holds the
    /// exclusive lock. An exclusive request passes when the page has no
    /// holders, when the caller already holds it exclusively, or when
    /// the caller is the sole shared holder (in-place upgrade; the
    /// shared entry stays, subsumed by the exclusive one).
    fn try_grant(&mut self, tid: TransactionID, lock: &Lock, pid: &HeapPageId) -> bool {
        if let Some(x_holder) = self.x_holders.get(pid) {
            if *x_holder != tid {
                return false;
            }
            if *lock == Lock::XLock {
                return true;
            }
        }

        match lock {
            Lock::SLock => {
                self.s_holders.entry(*pid).or_default().insert(tid);
            }
            Lock::XLock => {
                if let Some(s_holders) = self.s_holders.get(pid) {
                    let sole_holder = s_holders.len() == 1 && s_holders.contains(&tid);
                    if !sole_holder {
                        return false;
                    }
                }
                self.x_holders.insert(*pid, tid);
            }
        }
        true
    }

    fn release(&mut self, tid: TransactionID, lock: &Lock, pid: &HeapPageId) {
        match lock {
            Lock::SLock => {
                if let Some(s_holders) = self.s_holders.get_mut(pid) {
                    s_holders.remove(&tid);
                    if s_holders.is_empty() {
                        self.s_holders.remove(pid);
                    }
                }
            }
            Lock::XLock => {
                if self.x_holders.get(pid) == Some(&tid) {
                    self.x_holders.remove(pid);
                }
            }
        }
    }

    fn remove_waiter(&mut self, tid: TransactionID) {
        self.waiters.retain(|w| *w != tid);
    }
}

/// Per-page shared/exclusive locks under a single monitor. Waiting is
/// bounded: every wait on the monitor draws a fresh random budget, and
/// a wait that outlives its budget aborts the transaction. That
/// timeout is the sole deadlock remedy.
///
/// Strict 2PL is the callers' contract: locks are only released through
/// `BufferPool::transaction_complete` (or the explicitly unsafe
/// release used by tests).
pub struct LockManager {
    table: Mutex<LockTable>,
    monitor: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            monitor: Condvar::new(),
        }
    }

    /// Block until the lock is granted, or raise `TransactionAborted`
    /// once a wait exhausts its drawn budget.
    pub fn acquire_lock(&self, tx: &Transaction, lock: &Lock, pid: &HeapPageId) -> DbResult {
        let tid = tx.get_id();
        let mut table = self
            .table
            .lock()
            .map_err(|_| DbError::new("lock table poisoned"))?;

        loop {
            if table.try_grant(tid, lock, pid) {
                table.remove_waiter(tid);
                return Ok(());
            }

            if !table.waiters.contains(&tid) {
                table.waiters.push(tid);
            }

            let budget =
                Duration::from_millis(rand::thread_rng().gen_range(MIN_WAIT_MS, MAX_WAIT_MS));
            let started = Instant::now();
            let (guard, _) = self
                .monitor
                .wait_timeout(table, budget)
                .map_err(|_| DbError::new("lock table poisoned"))?;
            table = guard;

            // woken: retry once before judging the budget
            if table.try_grant(tid, lock, pid) {
                table.remove_waiter(tid);
                return Ok(());
            }

            if started.elapsed() >= budget {
                table.remove_waiter(tid);
                debug!("{} gives up waiting for {:?} on page {}", tx, lock, pid);
                return Err(DbError::aborted(&format!(
                    "{} timed out waiting for {:?} on page {}",
                    tx, lock, pid
                )));
            }
        }
    }

    /// Drop the given mode's entry for the transaction and wake every
    /// waiter. Idempotent.
    pub fn release_lock(&self, tx: &Transaction, lock: &Lock, pid: &HeapPageId) {
        let mut table = self.table.lock().unwrap();
        table.release(tx.get_id(), lock, pid);
        table.remove_waiter(tx.get_id());
        self.monitor.notify_all();
    }

    /// Drop both modes' entries for the transaction on this page.
    pub fn release_page(&self, tx: &Transaction, pid: &HeapPageId) {
        let mut table = self.table.lock().unwrap();
        table.release(tx.get_id(), &Lock::SLock, pid);
        table.release(tx.get_id(), &Lock::XLock, pid);
        table.remove_waiter(tx.get_id());
        self.monitor.notify_all();
    }

    /// True iff the transaction holds this page in either mode.
    pub fn holds_lock(&self, tx: &Transaction, pid: &HeapPageId) -> bool {
        let table = self.table.lock().unwrap();
        let tid = tx.get_id();

        if table.x_holders.get(pid) == Some(&tid) {
            return true;
        }
        table
            .s_holders
            .get(pid)
            .map(|holders| holders.contains(&tid))
            .unwrap_or(false)
    }

    /// Every page on which the transaction appears in a holder list.
    pub fn pages_held_by(&self, tx: &Transaction) -> HashSet<HeapPageId> {
        let table = self.table.lock().unwrap();
        let tid = tx.get_id();

        let mut pages: HashSet<HeapPageId> = HashSet::new();
        for (pid, holders) in table.s_holders.iter() {
            if holders.contains(&tid) {
                pages.insert(*pid);
            }
        }
        for (pid, holder) in table.x_holders.iter() {
            if *holder == tid {
                pages.insert(*pid);
            }
        }
        pages
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn pid(page_index: u32) -> HeapPageId {
        HeapPageId::new(42, page_index)
    }

    #[test]
    fn test_shared_locks_coexist() {
        let lock_manager = LockManager::new();
        let tx1 = Transaction::new();
        let tx2 = Transaction::new();

        lock_manager.acquire_lock(&tx1, &Lock::SLock, &pid(0)).unwrap();
        lock_manager.acquire_lock(&tx2, &Lock::SLock, &pid(0)).unwrap();

        assert!(lock_manager.holds_lock(&tx1, &pid(0)));
        assert!(lock_manager.holds_lock(&tx2, &pid(0)));
    }

    #[test]
    fn test_exclusive_conflict_times_out() {
        let lock_manager = LockManager::new();
        let tx1 = Transaction::new();
        let tx2 = Transaction::new();

        lock_manager.acquire_lock(&tx1, &Lock::XLock, &pid(1)).unwrap();

        let started = Instant::now();
        let err = lock_manager
            .acquire_lock(&tx2, &Lock::XLock, &pid(1))
            .unwrap_err();
        assert!(err.is_aborted());

        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(MIN_WAIT_MS));
        // the budget is drawn below MAX_WAIT_MS, leave some slack for
        // slow machines
        assert!(waited < Duration::from_millis(MAX_WAIT_MS + 1000));
    }

    #[test]
    fn test_sole_holder_upgrades_in_place() {
        let lock_manager = LockManager::new();
        let tx = Transaction::new();

        lock_manager.acquire_lock(&tx, &Lock::SLock, &pid(2)).unwrap();

        let started = Instant::now();
        lock_manager.acquire_lock(&tx, &Lock::XLock, &pid(2)).unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(lock_manager.holds_lock(&tx, &pid(2)));
    }

    #[test]
    fn test_upgrade_blocked_by_second_reader() {
        let lock_manager = LockManager::new();
        let tx1 = Transaction::new();
        let tx2 = Transaction::new();

        lock_manager.acquire_lock(&tx1, &Lock::SLock, &pid(3)).unwrap();
        lock_manager.acquire_lock(&tx2, &Lock::SLock, &pid(3)).unwrap();

        let err = lock_manager
            .acquire_lock(&tx1, &Lock::XLock, &pid(3))
            .unwrap_err();
        assert!(err.is_aborted());
    }

    #[test]
    fn test_release_makes_page_available() {
        let lock_manager = LockManager::new();
        let tx1 = Transaction::new();
        let tx2 = Transaction::new();

        lock_manager.acquire_lock(&tx1, &Lock::XLock, &pid(4)).unwrap();
        lock_manager.release_page(&tx1, &pid(4));
        assert!(!lock_manager.holds_lock(&tx1, &pid(4)));

        // released twice, still fine
        lock_manager.release_page(&tx1, &pid(4));

        lock_manager.acquire_lock(&tx2, &Lock::XLock, &pid(4)).unwrap();
        assert!(lock_manager.holds_lock(&tx2, &pid(4)));
    }

    #[test]
    fn test_pages_held_by_covers_both_modes() {
        let lock_manager = LockManager::new();
        let tx = Transaction::new();

        lock_manager.acquire_lock(&tx, &Lock::SLock, &pid(5)).unwrap();
        lock_manager.acquire_lock(&tx, &Lock::XLock, &pid(6)).unwrap();

        let pages = lock_manager.pages_held_by(&tx);
        assert!(pages.contains(&pid(5)));
        assert!(pages.contains(&pid(6)));
        assert_eq!(pages.len(), 2);
    }
}
