//! Data interface class (Class ID: 1)
//!
//! The simplest COSEM class: attribute 1 is the logical name, attribute 2 a
//! single value. No methods.
//!
//! ```rust
//! use dlms_core::{DataObject, ObisCode};
//! use dlms_interface::access::AttributeAccessMode;
//! use dlms_interface::data::Data;
//!
//! let data = Data::new(ObisCode::new(0, 0, 96, 1, 0, 255), DataObject::Unsigned32(12345))
//!     .with_access(AttributeAccessMode::AuthenticatedReadWrite);
//! let value = data.value_handle();
//! let object = data.into_object();
//! assert_eq!(object.class_id(), 1);
//! assert_eq!(value.get_value(), DataObject::Unsigned32(12345));
//! ```

use crate::access::AttributeAccessMode;
use crate::accessor::{AccessRequest, AttributeAccessor};
use crate::object::CosemObject;
use dlms_application::pdu::DataAccessResult;
use dlms_core::{DataObject, ObisCode};
use std::sync::{Arc, PoisonError, RwLock};

/// Data interface class (Class ID: 1)
#[derive(Debug, Clone)]
pub struct Data {
    logical_name: ObisCode,
    value: Arc<DataValue>,
    mode: AttributeAccessMode,
}

impl Data {
    pub const CLASS_ID: u16 = 1;
    pub const VERSION: u8 = 0;
    pub const ATTR_VALUE: u8 = 2;

    pub fn new(logical_name: ObisCode, value: DataObject) -> Self {
        Self {
            logical_name,
            value: Arc::new(DataValue::new(value)),
            mode: AttributeAccessMode::ReadWrite,
        }
    }

    /// Access mode of the value attribute.
    pub fn with_access(mut self, mode: AttributeAccessMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shared handle to the value, usable after registration.
    pub fn value_handle(&self) -> Arc<DataValue> {
        Arc::clone(&self.value)
    }

    pub fn into_object(self) -> CosemObject {
        CosemObject::new(Self::CLASS_ID, Self::VERSION, self.logical_name).with_attribute(
            Self::ATTR_VALUE,
            self.mode,
            self.value,
        )
    }
}

/// Value attribute of a Data object
#[derive(Debug, Default)]
pub struct DataValue {
    value: RwLock<DataObject>,
}

impl DataValue {
    pub fn new(value: DataObject) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    pub fn get_value(&self) -> DataObject {
        self.value.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_value(&self, value: DataObject) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

impl AttributeAccessor for DataValue {
    fn get(&self, _request: &AccessRequest) -> Result<DataObject, DataAccessResult> {
        Ok(self.get_value())
    }

    /// A value that is not null keeps its type.
    fn set(&self, _request: &AccessRequest, value: DataObject) -> Result<(), DataAccessResult> {
        let mut current = self.value.write().unwrap_or_else(PoisonError::into_inner);
        if !current.is_null() && !value.is_null() && current.get_type() != value.get_type() {
            return Err(DataAccessResult::TypeUnmatched);
        }
        *current = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AccessRequest {
        AccessRequest::new(1, 16, 0)
    }

    #[test]
    fn test_data_object_registration() {
        let obis = ObisCode::new(1, 1, 1, 8, 0, 255);
        let object = Data::new(obis, DataObject::Integer32(12345)).into_object();

        assert_eq!(object.class_id(), 1);
        assert_eq!(object.logical_name(), obis);
        let name = object.attribute(1).unwrap().accessor.get(&request()).unwrap();
        assert_eq!(name, DataObject::OctetString(obis.as_bytes().to_vec()));
        let value = object.attribute(2).unwrap();
        assert_eq!(value.mode, AttributeAccessMode::ReadWrite);
        assert_eq!(value.accessor.get(&request()), Ok(DataObject::Integer32(12345)));
    }

    #[test]
    fn test_data_set_value() {
        let data = Data::new(ObisCode::new(0, 0, 96, 1, 0, 255), DataObject::Integer32(1));
        let handle = data.value_handle();
        let object = data.into_object();
        let accessor = &object.attribute(2).unwrap().accessor;

        accessor.set(&request(), DataObject::Integer32(67890)).unwrap();
        assert_eq!(handle.get_value(), DataObject::Integer32(67890));
        assert_eq!(
            accessor.set(&request(), DataObject::Boolean(true)),
            Err(DataAccessResult::TypeUnmatched)
        );
    }

    #[test]
    fn test_null_value_accepts_any_type() {
        let value = DataValue::default();
        value.set(&request(), DataObject::VisibleString(b"meter".to_vec())).unwrap();
        assert_eq!(value.get_value(), DataObject::VisibleString(b"meter".to_vec()));
    }
}
