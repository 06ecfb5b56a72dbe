use std::fmt::Debug;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Type {
    /// 4-byte big-endian signed integer.
    Int,
    /// Fixed-length string of `n` payload bytes, stored as a 4-byte
    /// length prefix followed by the space-padded payload.
    Char(usize),
}

impl Type {
    /// Serialized width of a value of this type in bytes.
    pub fn get_size(&self) -> usize {
        match self {
            Type::Int => 4,
            Type::Char(len) => 4 + len,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct FieldItem {
    pub field_name: String,
    pub field_type: Type,
}

impl FieldItem {
    pub fn new(field_name: &str, field_type: Type) -> FieldItem {
        FieldItem {
            field_type,
            field_name: field_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub fields: Vec<FieldItem>,
}

impl Schema {
    pub fn new(fields: Vec<FieldItem>) -> Schema {
        Schema { fields }
    }

    /// Get the row size in bytes.
    pub fn get_size(&self) -> usize {
        self.fields.iter().map(|f| f.field_type.get_size()).sum()
    }

    pub fn get_field_count(&self) -> usize {
        self.fields.len()
    }
}

pub fn small_int_schema(width: usize, name_prefix: &str) -> Schema {
    let mut fields: Vec<FieldItem> = Vec::new();
    for i in 0..width {
        let field = FieldItem {
            field_name: format!("{}-{}", name_prefix, i),
            field_type: Type::Int,
        };
        fields.push(field);
    }

    Schema { fields }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_size() {
        assert_eq!(small_int_schema(3, "").get_size(), 12);

        let schema = Schema::new(vec![
            FieldItem::new("id", Type::Int),
            FieldItem::new("name", Type::Char(16)),
        ]);
        assert_eq!(schema.get_size(), 4 + 4 + 16);
    }
}
