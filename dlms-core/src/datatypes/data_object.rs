//! Data values exchanged through GET/SET/ACTION and READ/WRITE

use crate::datatypes::bit_string::BitString;
use crate::error::{DlmsError, DlmsResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A COSEM `Data` value.
///
/// Covers the simple types, strings and the two container types of the
/// A-XDR `Data` CHOICE. Date/time values travel as octet strings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum DataObject {
    #[default]
    Null,
    Boolean(bool),
    BitString(BitString),
    Integer8(i8),
    Integer16(i16),
    Integer32(i32),
    Integer64(i64),
    Unsigned8(u8),
    Unsigned16(u16),
    Unsigned32(u32),
    Unsigned64(u64),
    Float32(f32),
    Float64(f64),
    Enumerate(u8),
    Bcd(u8),
    OctetString(#[serde(with = "serde_bytes")] Vec<u8>),
    VisibleString(#[serde(with = "serde_bytes")] Vec<u8>),
    Utf8String(#[serde(with = "serde_bytes")] Vec<u8>),
    Array(Vec<DataObject>),
    Structure(Vec<DataObject>),
}

/// Discriminant of a [`DataObject`], used to check array homogeneity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataObjectType {
    NullData,
    Boolean,
    BitString,
    Integer,
    LongInteger,
    DoubleLong,
    Long64,
    Unsigned,
    LongUnsigned,
    DoubleLongUnsigned,
    Long64Unsigned,
    Float32,
    Float64,
    Enumerate,
    Bcd,
    OctetString,
    VisibleString,
    Utf8String,
    Array,
    Structure,
}

impl DataObject {
    pub fn get_type(&self) -> DataObjectType {
        match self {
            DataObject::Null => DataObjectType::NullData,
            DataObject::Boolean(_) => DataObjectType::Boolean,
            DataObject::BitString(_) => DataObjectType::BitString,
            DataObject::Integer8(_) => DataObjectType::Integer,
            DataObject::Integer16(_) => DataObjectType::LongInteger,
            DataObject::Integer32(_) => DataObjectType::DoubleLong,
            DataObject::Integer64(_) => DataObjectType::Long64,
            DataObject::Unsigned8(_) => DataObjectType::Unsigned,
            DataObject::Unsigned16(_) => DataObjectType::LongUnsigned,
            DataObject::Unsigned32(_) => DataObjectType::DoubleLongUnsigned,
            DataObject::Unsigned64(_) => DataObjectType::Long64Unsigned,
            DataObject::Float32(_) => DataObjectType::Float32,
            DataObject::Float64(_) => DataObjectType::Float64,
            DataObject::Enumerate(_) => DataObjectType::Enumerate,
            DataObject::Bcd(_) => DataObjectType::Bcd,
            DataObject::OctetString(_) => DataObjectType::OctetString,
            DataObject::VisibleString(_) => DataObjectType::VisibleString,
            DataObject::Utf8String(_) => DataObjectType::Utf8String,
            DataObject::Array(_) => DataObjectType::Array,
            DataObject::Structure(_) => DataObjectType::Structure,
        }
    }

    /// Constructs an array, checking that all elements share one type
    ///
    /// # Errors
    ///
    /// Returns an error if array elements have different types
    pub fn new_array(array: Vec<DataObject>) -> DlmsResult<Self> {
        if let Some(first) = array.first() {
            let array_type = first.get_type();
            if let Some((index, sub)) = array
                .iter()
                .enumerate()
                .find(|(_, sub)| sub.get_type() != array_type)
            {
                return Err(DlmsError::InvalidData(format!(
                    "Array is of type {:?}, but element at {} is of type {:?}",
                    array_type,
                    index,
                    sub.get_type()
                )));
            }
        }
        Ok(DataObject::Array(array))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DataObject::Null)
    }

    pub fn as_bool(&self) -> DlmsResult<bool> {
        match self {
            DataObject::Boolean(b) => Ok(*b),
            _ => Err(self.type_mismatch("Boolean")),
        }
    }

    /// Any integer variant widened to `i64`.
    pub fn as_i64(&self) -> DlmsResult<i64> {
        match self {
            DataObject::Integer8(v) => Ok(i64::from(*v)),
            DataObject::Integer16(v) => Ok(i64::from(*v)),
            DataObject::Integer32(v) => Ok(i64::from(*v)),
            DataObject::Integer64(v) => Ok(*v),
            DataObject::Unsigned8(v) | DataObject::Enumerate(v) => Ok(i64::from(*v)),
            DataObject::Unsigned16(v) => Ok(i64::from(*v)),
            DataObject::Unsigned32(v) => Ok(i64::from(*v)),
            _ => Err(self.type_mismatch("integer")),
        }
    }

    pub fn as_octet_string(&self) -> DlmsResult<&[u8]> {
        match self {
            DataObject::OctetString(s) => Ok(s),
            _ => Err(self.type_mismatch("OctetString")),
        }
    }

    pub fn as_array(&self) -> DlmsResult<&[DataObject]> {
        match self {
            DataObject::Array(a) => Ok(a),
            _ => Err(self.type_mismatch("Array")),
        }
    }

    pub fn as_structure(&self) -> DlmsResult<&[DataObject]> {
        match self {
            DataObject::Structure(s) => Ok(s),
            _ => Err(self.type_mismatch("Structure")),
        }
    }

    fn type_mismatch(&self, expected: &str) -> DlmsError {
        DlmsError::InvalidData(format!("Expected {}, got {:?}", expected, self.get_type()))
    }
}

impl fmt::Display for DataObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataObject::Null => write!(f, "NULL_DATA"),
            DataObject::Boolean(b) => write!(f, "BOOLEAN: {}", b),
            DataObject::BitString(bs) => write!(f, "BIT_STRING: {}", bs),
            DataObject::Integer8(i) => write!(f, "INTEGER: {}", i),
            DataObject::Integer16(i) => write!(f, "LONG_INTEGER: {}", i),
            DataObject::Integer32(i) => write!(f, "DOUBLE_LONG: {}", i),
            DataObject::Integer64(i) => write!(f, "LONG64: {}", i),
            DataObject::Unsigned8(u) => write!(f, "UNSIGNED: {}", u),
            DataObject::Unsigned16(u) => write!(f, "LONG_UNSIGNED: {}", u),
            DataObject::Unsigned32(u) => write!(f, "DOUBLE_LONG_UNSIGNED: {}", u),
            DataObject::Unsigned64(u) => write!(f, "LONG64_UNSIGNED: {}", u),
            DataObject::Float32(v) => write!(f, "FLOAT32: {}", v),
            DataObject::Float64(v) => write!(f, "FLOAT64: {}", v),
            DataObject::Enumerate(e) => write!(f, "ENUMERATE: {}", e),
            DataObject::Bcd(b) => write!(f, "BCD: {}", b),
            DataObject::OctetString(s) => {
                write!(f, "OCTET_STRING: ")?;
                for byte in s {
                    write!(f, "{:02X}", byte)?;
                }
                Ok(())
            }
            DataObject::VisibleString(s) => {
                write!(f, "VISIBLE_STRING: {}", String::from_utf8_lossy(s))
            }
            DataObject::Utf8String(s) => write!(f, "UTF8_STRING: {}", String::from_utf8_lossy(s)),
            DataObject::Array(items) | DataObject::Structure(items) => {
                let label = if matches!(self, DataObject::Array(_)) { "ARRAY" } else { "STRUCTURE" };
                write!(f, "{}: {} element(s)", label, items.len())?;
                for (i, elem) in items.iter().enumerate() {
                    write!(f, "\n  [{}]: {}", i, elem)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_object_array_mixed_types() {
        let arr = vec![DataObject::Integer32(1), DataObject::Boolean(true)];
        assert!(DataObject::new_array(arr).is_err());
    }

    #[test]
    fn test_data_object_accessors() {
        assert_eq!(DataObject::Unsigned16(500).as_i64().unwrap(), 500);
        assert_eq!(DataObject::OctetString(vec![1, 2]).as_octet_string().unwrap(), &[1, 2]);
        assert!(DataObject::Null.as_bool().is_err());
        let array = DataObject::new_array(vec![DataObject::Enumerate(1), DataObject::Enumerate(2)])
            .unwrap();
        assert_eq!(array.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_display_octet_string() {
        let value = DataObject::OctetString(vec![0x0A, 0xFF]);
        assert_eq!(value.to_string(), "OCTET_STRING: 0AFF");
    }
}
