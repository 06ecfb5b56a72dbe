use std::fmt;

use bit_vec::BitVec;

use crate::{
    error::DbError,
    storage::buffer_pool::BufferPool,
    storage::schema::Schema,
    storage::tuple::{RecordId, Tuple},
    transaction::TransactionID,
    types::DbResult,
    utils::ceil_div,
};

/// Identifies a unique page: the owning table and the position of the
/// page within it, starting from 0.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct HeapPageId {
    pub table_id: u32,
    pub page_index: u32,
}

impl HeapPageId {
    pub fn new(table_id: u32, page_index: u32) -> Self {
        Self {
            table_id,
            page_index,
        }
    }

    pub fn get_table_id(&self) -> u32 {
        self.table_id
    }

    pub fn get_page_index(&self) -> u32 {
        self.page_index
    }
}

impl fmt::Display for HeapPageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}_{}", self.table_id, self.page_index)
    }
}

impl fmt::Debug for HeapPageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

pub fn empty_page_data() -> Vec<u8> {
    vec![0; BufferPool::get_page_size()]
}

/// A fixed-size slotted page: a slot-occupancy bitmap followed by
/// `slot_count` fixed-width tuple records, zero-padded to the page
/// size.
///
/// On disk, slot `i` maps to bit `i % 8` of header byte `i / 8`,
/// least-significant bit first. Vacant slots' body bytes are ignored on
/// read and zeroed on serialization.
pub struct HeapPage {
    pid: HeapPageId,
    schema: Schema,

    pub slot_count: usize,

    // indicate slots' status: true means occupied, false means empty
    header: BitVec,

    // all slots (vacant ones hold a placeholder)
    tuples: Vec<Tuple>,

    // byte image captured at load time, refreshed after each flush
    old_data: Vec<u8>,

    dirtied_by: Option<TransactionID>,
}

impl HeapPage {
    pub fn new(pid: &HeapPageId, bytes: &[u8], schema: &Schema) -> Result<Self, DbError> {
        if bytes.len() != BufferPool::get_page_size() {
            return Err(DbError::new(&format!(
                "corrupt page {}: {} bytes",
                pid,
                bytes.len()
            )));
        }

        let slot_count = Self::calculate_slots_count(schema);
        let header_size = Self::calculate_header_size(slot_count);
        let width = schema.get_size();

        let mut header = BitVec::from_elem(slot_count, false);
        for i in 0..slot_count {
            if (bytes[i / 8] >> (i % 8)) & 1 == 1 {
                header.set(i, true);
            }
        }

        let mut tuples = Vec::with_capacity(slot_count);
        for i in 0..slot_count {
            if header[i] {
                let start = header_size + i * width;
                let mut tuple = Tuple::read_from(&bytes[start..start + width], schema)?;
                tuple.set_record_id(Some(RecordId::new(*pid, i)));
                tuples.push(tuple);
            } else {
                tuples.push(Tuple::new_default(schema));
            }
        }

        Ok(Self {
            pid: *pid,
            schema: schema.clone(),
            slot_count,
            header,
            tuples,
            old_data: bytes.to_vec(),
            dirtied_by: None,
        })
    }

    /// Retrieve the maximum number of tuples a page can hold: each slot
    /// costs one header bit on top of the tuple bytes.
    pub fn calculate_slots_count(schema: &Schema) -> usize {
        let bits_per_tuple_including_header = schema.get_size() * 8 + 1;
        BufferPool::get_page_size() * 8 / bits_per_tuple_including_header
    }

    pub fn calculate_header_size(slot_count: usize) -> usize {
        ceil_div(slot_count, 8)
    }

    pub fn get_pid(&self) -> HeapPageId {
        self.pid
    }

    pub fn get_schema(&self) -> &Schema {
        &self.schema
    }

    /// Serialize the page back to its on-disk image. In-memory
    /// tombstones are dropped: vacant slots come out zeroed.
    pub fn get_page_data(&self) -> Vec<u8> {
        let header_size = Self::calculate_header_size(self.slot_count);
        let width = self.schema.get_size();

        let mut data = vec![0u8; header_size];
        for i in 0..self.slot_count {
            if self.is_slot_used(i) {
                data[i / 8] |= 1 << (i % 8);
            }
        }

        for i in 0..self.slot_count {
            if self.is_slot_used(i) {
                let bytes = self.tuples[i]
                    .to_bytes()
                    .expect("resident tuples match the page schema");
                data.extend_from_slice(&bytes);
            } else {
                data.extend_from_slice(&vec![0; width]);
            }
        }

        data.resize(BufferPool::get_page_size(), 0);
        data
    }

    pub fn is_slot_used(&self, i: usize) -> bool {
        self.header.get(i).unwrap_or(false)
    }

    pub fn empty_slots_count(&self) -> usize {
        (0..self.slot_count).filter(|i| !self.is_slot_used(*i)).count()
    }

    /// Returns the number of tuples currently stored on this page.
    pub fn tuples_count(&self) -> usize {
        self.slot_count - self.empty_slots_count()
    }

    /// Place the tuple into the lowest-indexed empty slot and hand the
    /// caller's tuple its new record id. The dirty mark is the caller's
    /// business.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> DbResult {
        if *tuple.get_schema() != self.schema {
            return Err(DbError::new("tuple schema mismatch"));
        }

        for i in 0..self.slot_count {
            if !self.is_slot_used(i) {
                let rid = RecordId::new(self.pid, i);
                tuple.set_record_id(Some(rid));
                self.tuples[i] = tuple.clone();
                self.header.set(i, true);
                return Ok(());
            }
        }

        Err(DbError::new(&format!("page {} has no empty slot", self.pid)))
    }

    pub fn delete_tuple(&mut self, tuple: &Tuple) -> DbResult {
        let rid = tuple
            .get_record_id()
            .ok_or_else(|| DbError::new("tuple has no record id"))?;

        if rid.get_page_id() != self.pid
            || rid.get_slot() >= self.slot_count
            || !self.is_slot_used(rid.get_slot())
        {
            return Err(DbError::new(&format!("tuple not on page {}", self.pid)));
        }

        self.header.set(rid.get_slot(), false);
        self.tuples[rid.get_slot()] = Tuple::new_default(&self.schema);
        Ok(())
    }

    /// Live tuples in ascending slot order. Not restartable, request a
    /// fresh iterator instead.
    pub fn iter(&self) -> HeapPageIterator {
        HeapPageIterator {
            page: self,
            slot: 0,
        }
    }

    pub fn mark_dirty(&mut self, dirtied_by: Option<TransactionID>) {
        self.dirtied_by = dirtied_by;
    }

    /// The last dirtying transaction, or none for a clean page.
    pub fn dirtied_by(&self) -> Option<TransactionID> {
        self.dirtied_by
    }

    /// A copy of the page as of the last load or flush.
    pub fn get_before_image(&self) -> Result<HeapPage, DbError> {
        HeapPage::new(&self.pid, &self.old_data, &self.schema)
    }

    pub fn get_before_image_data(&self) -> Vec<u8> {
        self.old_data.clone()
    }

    pub fn set_before_image(&mut self) {
        self.old_data = self.get_page_data();
    }
}

impl fmt::Debug for HeapPage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "HeapPage({}, {}/{} slots used)",
            self.pid,
            self.tuples_count(),
            self.slot_count
        )
    }
}

pub struct HeapPageIterator<'a> {
    page: &'a HeapPage,
    slot: usize,
}

impl<'a> Iterator for HeapPageIterator<'a> {
    type Item = &'a Tuple;

    fn next(&mut self) -> Option<Self::Item> {
        while self.slot < self.page.slot_count {
            let slot = self.slot;
            self.slot += 1;
            if self.page.is_slot_used(slot) {
                return Some(&self.page.tuples[slot]);
            }
        }
        None
    }
}
