//! Association LN interface class (Class ID: 15)
//!
//! Only the members the association engine relies on are modelled: the
//! logical name, the xDLMS context info and method 1, `reply_to_HLS_authentication`.
//! The method itself is answered by the association loop, which owns the
//! challenges; the directory never dispatches it to an accessor.

use crate::access::AttributeAccessMode;
use crate::accessor::ConstantAttribute;
use crate::object::CosemObject;
use dlms_application::pdu::{Conformance, CosemMethodDescriptor, DLMS_VERSION_6};
use dlms_core::{BitString, DataObject, DlmsResult, ObisCode};
use std::sync::Arc;

pub struct AssociationLn;

impl AssociationLn {
    pub const CLASS_ID: u16 = 15;
    pub const VERSION: u8 = 1;
    /// Current association, 0-0:40.0.0.255
    pub const LOGICAL_NAME: ObisCode = ObisCode::new(0, 0, 40, 0, 0, 255);

    pub const ATTR_XDLMS_CONTEXT_INFO: u8 = 6;
    pub const METHOD_REPLY_TO_HLS_AUTHENTICATION: u8 = 1;

    pub const fn reply_to_hls_method() -> CosemMethodDescriptor {
        CosemMethodDescriptor::new(
            Self::CLASS_ID,
            Self::LOGICAL_NAME,
            Self::METHOD_REPLY_TO_HLS_AUTHENTICATION,
        )
    }

    pub fn is_reply_to_hls(method: &CosemMethodDescriptor) -> bool {
        *method == Self::reply_to_hls_method()
    }

    /// Current-association object advertising the server's xDLMS context.
    pub fn object(conformance: Conformance, max_pdu_size: u16) -> DlmsResult<CosemObject> {
        Ok(CosemObject::new(Self::CLASS_ID, Self::VERSION, Self::LOGICAL_NAME).with_attribute(
            Self::ATTR_XDLMS_CONTEXT_INFO,
            AttributeAccessMode::Read,
            Arc::new(ConstantAttribute(xdlms_context_info(conformance, max_pdu_size)?)),
        ))
    }
}

/// xDLMS-context-type: conformance, max receive and send PDU size, version,
/// quality of service and ciphering info.
fn xdlms_context_info(conformance: Conformance, max_pdu_size: u16) -> DlmsResult<DataObject> {
    let bits = conformance.bits().to_be_bytes();
    Ok(DataObject::Structure(vec![
        DataObject::BitString(BitString::new(bits[1..].to_vec(), 24)?),
        DataObject::Unsigned16(max_pdu_size),
        DataObject::Unsigned16(max_pdu_size),
        DataObject::Unsigned8(DLMS_VERSION_6),
        DataObject::Integer8(0),
        DataObject::OctetString(Vec::new()),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::AccessRequest;

    #[test]
    fn test_reply_to_hls_descriptor() {
        let method = CosemMethodDescriptor::new(15, ObisCode::new(0, 0, 40, 0, 0, 255), 1);
        assert!(AssociationLn::is_reply_to_hls(&method));
        let other = CosemMethodDescriptor::new(15, ObisCode::new(0, 0, 40, 0, 0, 255), 2);
        assert!(!AssociationLn::is_reply_to_hls(&other));
    }

    #[test]
    fn test_context_info_attribute() {
        let object = AssociationLn::object(Conformance::logical_name_default(), 1024).unwrap();
        let info = object
            .attribute(AssociationLn::ATTR_XDLMS_CONTEXT_INFO)
            .unwrap()
            .accessor
            .get(&AccessRequest::new(1, 16, 0))
            .unwrap();
        let fields = info.as_structure().unwrap();
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[1], DataObject::Unsigned16(1024));
        assert_eq!(fields[3], DataObject::Unsigned8(6));
        match &fields[0] {
            DataObject::BitString(bits) => assert_eq!(bits.as_bytes(), &[0x00, 0x76, 0x1D]),
            other => panic!("unexpected {:?}", other),
        }
    }
}
