use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use log::debug;

use crate::{
    storage::page::HeapPageId,
    transaction::{Transaction, TransactionID},
    types::DbResult,
};

#[derive(Debug, PartialEq, Clone, Copy)]
enum RecordType {
    Abort = 0,
    Commit = 1,
    Update = 2,
    Start = 3,
}

/// Append-only write-ahead log.
///
/// Record layout: a type byte, the big-endian transaction id, and for
/// UPDATE records the page id plus both full page images (undo first,
/// redo second). The kernel's only obligations are the append calls
/// and `force`; replaying the records is someone else's job.
pub struct LogManager {
    file: Mutex<File>,
    file_path: PathBuf,
    total_records: usize,
}

impl LogManager {
    /// Open (and truncate) the log file at the given path.
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        File::create(&file_path).expect("io error");
        let file = OpenOptions::new()
            .write(true)
            .read(true)
            .open(&file_path)
            .expect("io error");

        Self {
            file: Mutex::new(file),
            file_path: file_path.as_ref().to_path_buf(),
            total_records: 0,
        }
    }

    /// Truncate the log and forget all counters.
    pub fn reset(&mut self) {
        let file = self.get_file();
        file.set_len(0).expect("io error");
        drop(file);
        self.total_records = 0;
        debug!("log {} truncated", self.file_path.display());
    }

    pub fn records_count(&self) -> usize {
        self.total_records
    }

    fn get_file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap()
    }

    pub fn log_start(&mut self, tx: &Transaction) -> DbResult {
        self.append_status_record(RecordType::Start, tx.get_id())
    }

    pub fn log_commit(&mut self, tx: &Transaction) -> DbResult {
        self.append_status_record(RecordType::Commit, tx.get_id())?;
        self.force()
    }

    pub fn log_abort(&mut self, tx: &Transaction) -> DbResult {
        self.append_status_record(RecordType::Abort, tx.get_id())?;
        self.force()
    }

    /// Append a redo/undo record carrying both images of the page.
    pub fn log_update(
        &mut self,
        tid: TransactionID,
        pid: &HeapPageId,
        before_image: &[u8],
        after_image: &[u8],
    ) -> DbResult {
        {
            let mut file = self.get_file();
            file.write_all(&[RecordType::Update as u8])?;
            file.write_all(&tid.to_be_bytes())?;
            file.write_all(&pid.get_table_id().to_be_bytes())?;
            file.write_all(&pid.get_page_index().to_be_bytes())?;
            file.write_all(&(before_image.len() as u32).to_be_bytes())?;
            file.write_all(before_image)?;
            file.write_all(after_image)?;
        }

        debug!("update record for page {} written by tx_{}", pid, tid);
        self.total_records += 1;
        Ok(())
    }

    /// Push everything appended so far to durable storage.
    pub fn force(&mut self) -> DbResult {
        self.get_file().sync_all()?;
        Ok(())
    }

    fn append_status_record(&mut self, record_type: RecordType, tid: TransactionID) -> DbResult {
        {
            let mut file = self.get_file();
            file.write_all(&[record_type as u8])?;
            file.write_all(&tid.to_be_bytes())?;
        }

        self.total_records += 1;
        Ok(())
    }
}

impl Drop for LogManager {
    fn drop(&mut self) {
        let _ = self.force();
    }
}
