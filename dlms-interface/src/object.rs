//! Registration of a COSEM object: its identity plus one accessor per member

use crate::access::{AttributeAccessMode, MethodAccessMode};
use crate::accessor::{AttributeAccessor, ConstantAttribute, MethodAccessor};
use dlms_core::{DataObject, ObisCode};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Bytes of short-name space each attribute or method occupies
pub const SHORT_NAME_STRIDE: u16 = 8;

#[derive(Clone)]
pub struct AttributeEntry {
    pub mode: AttributeAccessMode,
    pub accessor: Arc<dyn AttributeAccessor>,
}

#[derive(Clone)]
pub struct MethodEntry {
    pub mode: MethodAccessMode,
    pub accessor: Arc<dyn MethodAccessor>,
}

/// A COSEM object as the object directory sees it
///
/// Attribute 1 (logical name) is registered by [`CosemObject::new`] as a
/// read-only constant.
#[derive(Clone)]
pub struct CosemObject {
    class_id: u16,
    version: u8,
    logical_name: ObisCode,
    short_name: Option<u16>,
    attributes: BTreeMap<u8, AttributeEntry>,
    methods: BTreeMap<u8, MethodEntry>,
}

impl CosemObject {
    pub fn new(class_id: u16, version: u8, logical_name: ObisCode) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            1,
            AttributeEntry {
                mode: AttributeAccessMode::Read,
                accessor: Arc::new(ConstantAttribute(DataObject::OctetString(
                    logical_name.as_bytes().to_vec(),
                ))),
            },
        );
        Self {
            class_id,
            version,
            logical_name,
            short_name: None,
            attributes,
            methods: BTreeMap::new(),
        }
    }

    pub fn with_attribute(
        mut self,
        attribute_id: u8,
        mode: AttributeAccessMode,
        accessor: Arc<dyn AttributeAccessor>,
    ) -> Self {
        self.attributes.insert(attribute_id, AttributeEntry { mode, accessor });
        self
    }

    pub fn with_method(
        mut self,
        method_id: u8,
        mode: MethodAccessMode,
        accessor: Arc<dyn MethodAccessor>,
    ) -> Self {
        self.methods.insert(method_id, MethodEntry { mode, accessor });
        self
    }

    /// Base name under short-name referencing.
    pub fn with_short_name(mut self, base_name: u16) -> Self {
        self.short_name = Some(base_name);
        self
    }

    pub fn class_id(&self) -> u16 {
        self.class_id
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn logical_name(&self) -> ObisCode {
        self.logical_name
    }

    pub fn short_name(&self) -> Option<u16> {
        self.short_name
    }

    pub fn attribute(&self, attribute_id: u8) -> Option<&AttributeEntry> {
        self.attributes.get(&attribute_id)
    }

    pub fn method(&self, method_id: u8) -> Option<&MethodEntry> {
        self.methods.get(&method_id)
    }

    /// Highest registered attribute id.
    pub fn attribute_count(&self) -> u8 {
        self.attributes.keys().next_back().copied().unwrap_or(0)
    }

    pub fn method_count(&self) -> u8 {
        self.methods.keys().next_back().copied().unwrap_or(0)
    }

    /// Number of short names the object occupies from its base name on.
    pub fn short_name_span(&self) -> u16 {
        SHORT_NAME_STRIDE * (self.attribute_count() as u16 + self.method_count() as u16)
    }

    /// Member addressed by `offset` bytes past the base name.
    pub fn member_at(&self, offset: u16) -> Option<ShortNameMember> {
        if offset % SHORT_NAME_STRIDE != 0 || offset >= self.short_name_span() {
            return None;
        }
        let index = offset / SHORT_NAME_STRIDE;
        let attributes = self.attribute_count() as u16;
        if index < attributes {
            Some(ShortNameMember::Attribute(index as u8 + 1))
        } else {
            Some(ShortNameMember::Method((index - attributes) as u8 + 1))
        }
    }
}

impl fmt::Debug for CosemObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CosemObject")
            .field("class_id", &self.class_id)
            .field("version", &self.version)
            .field("logical_name", &self.logical_name)
            .field("short_name", &self.short_name)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// What a short name resolves to inside one object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortNameMember {
    Attribute(u8),
    Method(u8),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::{AccessRequest, MockAttributeAccessor, MockMethodAccessor};

    fn clock_like() -> CosemObject {
        let mut attribute = MockAttributeAccessor::new();
        attribute.expect_get().returning(|_| Ok(DataObject::Unsigned8(7)));
        CosemObject::new(8, 0, ObisCode::new(0, 0, 1, 0, 0, 255))
            .with_attribute(2, AttributeAccessMode::Read, Arc::new(attribute))
            .with_attribute(3, AttributeAccessMode::Read, Arc::new(ConstantAttribute(DataObject::Null)))
            .with_method(1, MethodAccessMode::Access, Arc::new(MockMethodAccessor::new()))
            .with_short_name(0x2000)
    }

    #[test]
    fn test_logical_name_is_attribute_one() {
        let object = clock_like();
        let entry = object.attribute(1).unwrap();
        assert_eq!(entry.mode, AttributeAccessMode::Read);
        let value = entry.accessor.get(&AccessRequest::new(1, 16, 0)).unwrap();
        assert_eq!(value, DataObject::OctetString(vec![0, 0, 1, 0, 0, 255]));
        assert!(entry.accessor.set(&AccessRequest::new(1, 16, 0), DataObject::Null).is_err());
    }

    #[test]
    fn test_registered_accessor_is_called() {
        let object = clock_like();
        let value = object.attribute(2).unwrap().accessor.get(&AccessRequest::new(1, 16, 0));
        assert_eq!(value, Ok(DataObject::Unsigned8(7)));
        assert!(object.attribute(4).is_none());
        assert!(object.method(1).is_some());
    }

    #[test]
    fn test_short_name_layout() {
        let object = clock_like();
        assert_eq!(object.short_name(), Some(0x2000));
        assert_eq!(object.short_name_span(), 32);
        assert_eq!(object.member_at(0), Some(ShortNameMember::Attribute(1)));
        assert_eq!(object.member_at(16), Some(ShortNameMember::Attribute(3)));
        assert_eq!(object.member_at(24), Some(ShortNameMember::Method(1)));
        assert_eq!(object.member_at(32), None);
        assert_eq!(object.member_at(4), None);
    }
}
