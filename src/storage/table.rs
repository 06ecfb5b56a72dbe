use std::{
    collections::hash_map::DefaultHasher,
    fs::{File, OpenOptions},
    hash::{Hash, Hasher},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
    sync::Mutex,
};

use log::debug;

use crate::{
    common::Database,
    error::DbError,
    storage::buffer_pool::BufferPool,
    storage::page::{empty_page_data, HeapPage, HeapPageId},
    storage::schema::Schema,
    storage::tuple::Tuple,
    transaction::{Permission, Transaction},
    types::{DbResult, Pod},
    utils::{ceil_div, HandyRwLock},
};

/// Contract shared by every table file the catalog can serve. A heap
/// file is one variant; an index file would be another.
pub trait DbFile: Send + Sync {
    fn get_id(&self) -> u32;

    fn get_schema(&self) -> &Schema;

    /// Read the page straight from disk, bypassing the cache.
    fn read_page(&self, pid: &HeapPageId) -> Result<HeapPage, DbError>;

    fn write_page(&self, page: &HeapPage) -> DbResult;

    fn num_pages(&self) -> Result<u32, DbError>;

    /// Insert the tuple on behalf of the transaction and return the
    /// mutated pages. The caller's tuple receives its record id.
    fn insert_tuple(
        &self,
        tx: &Transaction,
        tuple: &mut Tuple,
    ) -> Result<Vec<Pod<HeapPage>>, DbError>;

    fn delete_tuple(&self, tx: &Transaction, tuple: &Tuple)
        -> Result<Vec<Pod<HeapPage>>, DbError>;

    fn iter(&self, tx: &Transaction) -> HeapTableIterator {
        HeapTableIterator::new(tx, self.get_id())
    }
}

/// An unordered table backed by a file of contiguous pages: page N
/// lives at byte offset N * page size, new pages are appended.
pub struct HeapTable {
    file: Mutex<File>,
    file_path: String,
    table_id: u32,
    schema: Schema,
}

impl HeapTable {
    /// Open the backing file, creating it when absent.
    pub fn new<P: AsRef<Path>>(path: P, schema: Schema) -> Self {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .expect("io error");

        let absolute = std::fs::canonicalize(&path).expect("io error");
        let file_path = absolute.to_string_lossy().to_string();

        // The table id is a stable hash of the absolute path, so every
        // handle on the same file agrees on the id.
        let mut hasher = DefaultHasher::new();
        file_path.hash(&mut hasher);
        let table_id = hasher.finish() as u32;

        Self {
            file: Mutex::new(file),
            file_path,
            table_id,
            schema,
        }
    }

    pub fn get_file_path(&self) -> &str {
        &self.file_path
    }

    /// Extend the file with one zeroed page. The file lock is held
    /// across the length check and the write, so concurrent appenders
    /// get distinct pages.
    fn append_empty_page(&self) -> Result<HeapPageId, DbError> {
        let page_size = BufferPool::get_page_size();
        let mut file = self.file.lock().unwrap();

        let len = file.metadata()?.len() as usize;
        let page_index = ceil_div(len, page_size) as u32;

        file.seek(SeekFrom::Start(page_index as u64 * page_size as u64))?;
        file.write_all(&empty_page_data())?;

        debug!("table {} grows to page {}", self.table_id, page_index);
        Ok(HeapPageId::new(self.table_id, page_index))
    }
}

impl DbFile for HeapTable {
    fn get_id(&self) -> u32 {
        self.table_id
    }

    fn get_schema(&self) -> &Schema {
        &self.schema
    }

    fn read_page(&self, pid: &HeapPageId) -> Result<HeapPage, DbError> {
        let page_size = BufferPool::get_page_size();
        let mut buf = vec![0; page_size];

        {
            let mut file = self.file.lock().unwrap();
            let start = pid.get_page_index() as u64 * page_size as u64;
            file.seek(SeekFrom::Start(start))?;

            // the tail page may be short on disk, the rest stays zeroed
            let mut read = 0;
            while read < page_size {
                let n = file.read(&mut buf[read..])?;
                if n == 0 {
                    break;
                }
                read += n;
            }
        }

        debug!("read page {} from disk", pid);
        HeapPage::new(pid, &buf, &self.schema)
    }

    fn write_page(&self, page: &HeapPage) -> DbResult {
        let pid = page.get_pid();
        let page_size = BufferPool::get_page_size();
        let data = page.get_page_data();

        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(
            pid.get_page_index() as u64 * page_size as u64,
        ))?;
        file.write_all(&data)?;
        Ok(())
    }

    fn num_pages(&self) -> Result<u32, DbError> {
        let len = self.file.lock().unwrap().metadata()?.len() as usize;
        Ok(ceil_div(len, BufferPool::get_page_size()) as u32)
    }

    fn insert_tuple(
        &self,
        tx: &Transaction,
        tuple: &mut Tuple,
    ) -> Result<Vec<Pod<HeapPage>>, DbError> {
        if *tuple.get_schema() != self.schema {
            return Err(DbError::new("tuple schema mismatch"));
        }

        // the first page with a free slot wins
        for page_index in 0..self.num_pages()? {
            let pid = HeapPageId::new(self.table_id, page_index);
            let page_pod = Database::buffer_pool().get_page(tx, Permission::ReadWrite, &pid)?;

            {
                let mut page = page_pod.wl();
                if page.empty_slots_count() > 0 {
                    page.insert_tuple(tuple)?;
                    drop(page);
                    return Ok(vec![page_pod]);
                }
            }
        }

        // every existing page is full, extend the file
        let pid = self.append_empty_page()?;
        let page_pod = Database::buffer_pool().get_page(tx, Permission::ReadWrite, &pid)?;
        page_pod.wl().insert_tuple(tuple)?;
        Ok(vec![page_pod])
    }

    fn delete_tuple(
        &self,
        tx: &Transaction,
        tuple: &Tuple,
    ) -> Result<Vec<Pod<HeapPage>>, DbError> {
        let rid = tuple
            .get_record_id()
            .ok_or_else(|| DbError::new("tuple has no record id"))?;
        let pid = rid.get_page_id();
        if pid.get_table_id() != self.table_id {
            return Err(DbError::new(&format!(
                "tuple belongs to table {}, not {}",
                pid.get_table_id(),
                self.table_id
            )));
        }

        let page_pod = Database::buffer_pool().get_page(tx, Permission::ReadWrite, &pid)?;
        page_pod.wl().delete_tuple(tuple)?;
        Ok(vec![page_pod])
    }
}

fn table_page_count(table_id: u32) -> Result<u32, DbError> {
    let table = Database::catalog()
        .get_table(&table_id)
        .ok_or_else(|| DbError::new(&format!("table {} not found", table_id)))?;
    table.num_pages()
}

/// Walks every page of a table through the buffer pool with shared
/// permission, yielding live tuples in slot order. Restartable via
/// `rewind`; after `close` the iterator stays empty.
pub struct HeapTableIterator {
    tx: Transaction,
    table_id: u32,
    page_count: Option<u32>,
    page_cursor: u32,
    rows: Vec<Tuple>,
    row_cursor: usize,
    peeked: Option<Tuple>,
    failed: Option<DbError>,
    closed: bool,
}

impl HeapTableIterator {
    pub fn new(tx: &Transaction, table_id: u32) -> Self {
        Self {
            tx: tx.clone(),
            table_id,
            page_count: None,
            page_cursor: 0,
            rows: Vec::new(),
            row_cursor: 0,
            peeked: None,
            failed: None,
            closed: false,
        }
    }

    /// Reset the page cursor to the start of the table. The page count
    /// is re-resolved on the next fetch.
    pub fn rewind(&mut self) {
        self.page_count = None;
        self.page_cursor = 0;
        self.rows.clear();
        self.row_cursor = 0;
        self.peeked = None;
        self.failed = None;
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.peeked = None;
        self.failed = None;
    }

    /// Idempotent: repeated calls return the same answer until the
    /// cursor advances. A failed page fetch also answers true; the
    /// error surfaces on the following `try_next`.
    pub fn has_next(&mut self) -> bool {
        if self.closed {
            return false;
        }
        if self.failed.is_some() {
            return true;
        }
        if self.peeked.is_none() {
            match self.advance() {
                Ok(tuple) => self.peeked = tuple,
                Err(e) => {
                    self.failed = Some(e);
                    return true;
                }
            }
        }
        self.peeked.is_some()
    }

    /// Fetch the next tuple. Lock timeouts and I/O failures propagate
    /// to the caller instead of truncating the scan; a closed iterator
    /// fails with `NoElement`.
    pub fn try_next(&mut self) -> Result<Option<Tuple>, DbError> {
        if self.closed {
            return Err(DbError::no_element("iterator is closed"));
        }
        if let Some(e) = self.failed.take() {
            return Err(e);
        }
        if let Some(tuple) = self.peeked.take() {
            return Ok(Some(tuple));
        }
        self.advance()
    }

    fn advance(&mut self) -> Result<Option<Tuple>, DbError> {
        let page_count = match self.page_count {
            Some(count) => count,
            None => {
                let count = table_page_count(self.table_id)?;
                self.page_count = Some(count);
                count
            }
        };

        loop {
            if self.row_cursor < self.rows.len() {
                let tuple = self.rows[self.row_cursor].clone();
                self.row_cursor += 1;
                return Ok(Some(tuple));
            }

            // empty pages are skipped until the table runs out
            if self.page_cursor >= page_count {
                return Ok(None);
            }
            let pid = HeapPageId::new(self.table_id, self.page_cursor);
            self.page_cursor += 1;
            self.row_cursor = 0;

            let page_pod = Database::buffer_pool().get_page(&self.tx, Permission::ReadOnly, &pid)?;
            self.rows = page_pod.rl().iter().cloned().collect();
        }
    }
}

impl Iterator for HeapTableIterator {
    type Item = Tuple;

    /// Infallible view over `try_next`: a closed iterator is simply
    /// exhausted, a failed page fetch panics instead of truncating the
    /// scan. Callers that need to observe lock timeouts use `try_next`.
    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        self.try_next().expect("scan failed")
    }
}
