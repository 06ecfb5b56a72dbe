use std::fmt;

use crate::{
    error::DbError,
    storage::page::HeapPageId,
    storage::schema::{Schema, Type},
};

/// Points at the physical location of one tuple: a page and a slot
/// within it.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct RecordId {
    pid: HeapPageId,
    slot: usize,
}

impl RecordId {
    pub fn new(pid: HeapPageId, slot: usize) -> Self {
        RecordId { pid, slot }
    }

    pub fn get_page_id(&self) -> HeapPageId {
        self.pid
    }

    pub fn get_slot(&self) -> usize {
        self.slot
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Int(i32),
    String(String),
}

impl Cell {
    fn encode(&self, t: &Type) -> Result<Vec<u8>, DbError> {
        match (self, t) {
            (Cell::Int(v), Type::Int) => Ok(v.to_be_bytes().to_vec()),
            (Cell::String(s), Type::Char(len)) => {
                if s.len() > *len {
                    return Err(DbError::new(&format!(
                        "string of {} bytes exceeds field width {}",
                        s.len(),
                        len
                    )));
                }

                let mut buf = Vec::with_capacity(4 + len);
                buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
                let mut payload = s.as_bytes().to_vec();
                payload.resize(*len, b' ');
                buf.extend_from_slice(&payload);
                Ok(buf)
            }
            _ => Err(DbError::new("cell does not match the declared field type")),
        }
    }

    fn decode(bytes: &[u8], t: &Type) -> Result<Cell, DbError> {
        if bytes.len() < t.get_size() {
            return Err(DbError::new("corrupt page: truncated field"));
        }

        match t {
            Type::Int => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&bytes[..4]);
                Ok(Cell::Int(i32::from_be_bytes(raw)))
            }
            Type::Char(len) => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&bytes[..4]);
                let used = (u32::from_be_bytes(raw) as usize).min(*len);
                let payload = &bytes[4..4 + len];
                let s = String::from_utf8_lossy(&payload[..used]).to_string();
                Ok(Cell::String(s))
            }
        }
    }

    fn matches(&self, t: &Type) -> bool {
        match (self, t) {
            (Cell::Int(_), Type::Int) => true,
            (Cell::String(s), Type::Char(len)) => s.len() <= *len,
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cell::Int(v) => write!(f, "{}", v),
            Cell::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// A fixed-width row governed by a schema. The record id is present
/// only while the tuple sits on a page; a freshly constructed tuple
/// carries none.
#[derive(Debug, Clone)]
pub struct Tuple {
    schema: Schema,
    cells: Vec<Cell>,
    rid: Option<RecordId>,
}

impl Tuple {
    pub fn new(schema: &Schema, cells: Vec<Cell>) -> Result<Tuple, DbError> {
        if cells.len() != schema.get_field_count() {
            return Err(DbError::new(&format!(
                "schema has {} fields, got {} cells",
                schema.get_field_count(),
                cells.len()
            )));
        }
        for (cell, field) in cells.iter().zip(&schema.fields) {
            if !cell.matches(&field.field_type) {
                return Err(DbError::new("cell does not match the declared field type"));
            }
        }

        Ok(Tuple {
            schema: schema.clone(),
            cells,
            rid: None,
        })
    }

    /// A tuple with every field set to its zero value. Used for vacant
    /// page slots.
    pub fn new_default(schema: &Schema) -> Tuple {
        let cells = schema
            .fields
            .iter()
            .map(|f| match f.field_type {
                Type::Int => Cell::Int(0),
                Type::Char(_) => Cell::String(String::new()),
            })
            .collect();

        Tuple {
            schema: schema.clone(),
            cells,
            rid: None,
        }
    }

    /// An all-int tuple with every cell set to `value`, handy for tests
    /// and bootstrap code.
    pub fn new_int_tuple(value: i32, width: usize) -> Tuple {
        let schema = crate::storage::schema::small_int_schema(width, "");
        let cells = vec![Cell::Int(value); width];

        Tuple {
            schema,
            cells,
            rid: None,
        }
    }

    pub fn read_from(bytes: &[u8], schema: &Schema) -> Result<Tuple, DbError> {
        let mut cells = Vec::with_capacity(schema.get_field_count());
        let mut start = 0;
        for field in &schema.fields {
            let end = start + field.field_type.get_size();
            if end > bytes.len() {
                return Err(DbError::new("corrupt page: truncated tuple"));
            }
            cells.push(Cell::decode(&bytes[start..end], &field.field_type)?);
            start = end;
        }

        Ok(Tuple {
            schema: schema.clone(),
            cells,
            rid: None,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DbError> {
        let mut buf = Vec::with_capacity(self.schema.get_size());
        for (cell, field) in self.cells.iter().zip(&self.schema.fields) {
            buf.extend(cell.encode(&field.field_type)?);
        }
        Ok(buf)
    }

    pub fn get_schema(&self) -> &Schema {
        &self.schema
    }

    pub fn get_cell(&self, i: usize) -> Cell {
        self.cells[i].clone()
    }

    pub fn set_cell(&mut self, i: usize, cell: Cell) {
        self.cells[i] = cell;
    }

    pub fn get_record_id(&self) -> Option<RecordId> {
        self.rid
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.rid = rid;
    }

    /// Compare the cells against a row of expected integers.
    pub fn equal_cells(&self, expect: &[i32]) -> bool {
        if self.cells.len() != expect.len() {
            return false;
        }
        self.cells
            .iter()
            .zip(expect)
            .all(|(cell, v)| *cell == Cell::Int(*v))
    }
}

// Record ids are deliberately left out, a scanned copy equals a fresh
// one with the same content.
impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.cells == other.cells
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let content: Vec<String> = self.cells.iter().map(|c| format!("{}", c)).collect();
        write!(f, "{{{}}}", content.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::{small_int_schema, FieldItem};

    #[test]
    fn test_int_round_trip() {
        let schema = small_int_schema(2, "");
        let tuple = Tuple::new(&schema, vec![Cell::Int(-7), Cell::Int(i32::MAX)]).unwrap();

        let bytes = tuple.to_bytes().unwrap();
        assert_eq!(bytes.len(), schema.get_size());
        // big-endian encoding of -7
        assert_eq!(&bytes[..4], &[0xff, 0xff, 0xff, 0xf9]);

        let decoded = Tuple::read_from(&bytes, &schema).unwrap();
        assert_eq!(decoded, tuple);
    }

    #[test]
    fn test_char_padding() {
        let schema = Schema::new(vec![FieldItem::new("name", Type::Char(8))]);
        let tuple = Tuple::new(&schema, vec![Cell::String("ab".to_string())]).unwrap();

        let bytes = tuple.to_bytes().unwrap();
        assert_eq!(bytes.len(), 12);
        // 4-byte length prefix, then the payload padded with spaces
        assert_eq!(&bytes[..4], &[0, 0, 0, 2]);
        assert_eq!(&bytes[4..], b"ab      ");

        let decoded = Tuple::read_from(&bytes, &schema).unwrap();
        assert_eq!(decoded.get_cell(0), Cell::String("ab".to_string()));
    }

    #[test]
    fn test_schema_validation() {
        let schema = small_int_schema(1, "");
        assert!(Tuple::new(&schema, vec![Cell::String("x".to_string())]).is_err());
        assert!(Tuple::new(&schema, vec![Cell::Int(1), Cell::Int(2)]).is_err());
    }

    #[test]
    fn test_oversized_string_rejected() {
        let schema = Schema::new(vec![FieldItem::new("name", Type::Char(2))]);
        assert!(Tuple::new(&schema, vec![Cell::String("abc".to_string())]).is_err());
    }
}
