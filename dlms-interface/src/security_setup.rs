//! Security Setup interface class (Class ID: 64)
//!
//! Exposes the security policy of the calling client and implements method
//! 2, `global_key_transfer`, which replaces the client's keys with keys
//! wrapped under its master key.

use crate::access::{AttributeAccessMode, MethodAccessMode};
use crate::accessor::{AccessRequest, AttributeAccessor, ConstantAttribute, MethodAccessor};
use crate::object::CosemObject;
use crate::restrictions::RestrictionTable;
use dlms_application::pdu::{ActionResult, DataAccessResult};
use dlms_core::{DataObject, ObisCode};
use dlms_security::utils::unwrap_aes_rfc3394_key;
use dlms_security::{KeyId, SystemTitle};
use std::sync::Arc;

pub struct SecuritySetup;

impl SecuritySetup {
    pub const CLASS_ID: u16 = 64;
    pub const VERSION: u8 = 0;
    /// 0-0:43.0.0.255
    pub const LOGICAL_NAME: ObisCode = ObisCode::new(0, 0, 43, 0, 0, 255);

    pub const ATTR_SECURITY_POLICY: u8 = 2;
    pub const ATTR_SECURITY_SUITE: u8 = 3;
    pub const ATTR_SERVER_SYSTEM_TITLE: u8 = 5;
    pub const METHOD_GLOBAL_KEY_TRANSFER: u8 = 2;

    pub fn object(restrictions: Arc<RestrictionTable>, server_system_title: SystemTitle) -> CosemObject {
        CosemObject::new(Self::CLASS_ID, Self::VERSION, Self::LOGICAL_NAME)
            .with_attribute(
                Self::ATTR_SECURITY_POLICY,
                AttributeAccessMode::Read,
                Arc::new(SecurityPolicyAttribute {
                    restrictions: Arc::clone(&restrictions),
                }),
            )
            // Suite 0, AES-GCM-128.
            .with_attribute(
                Self::ATTR_SECURITY_SUITE,
                AttributeAccessMode::Read,
                Arc::new(ConstantAttribute(DataObject::Enumerate(0))),
            )
            .with_attribute(
                Self::ATTR_SERVER_SYSTEM_TITLE,
                AttributeAccessMode::Read,
                Arc::new(ConstantAttribute(DataObject::OctetString(
                    server_system_title.as_slice().to_vec(),
                ))),
            )
            .with_method(
                Self::METHOD_GLOBAL_KEY_TRANSFER,
                MethodAccessMode::AuthenticatedAccess,
                Arc::new(GlobalKeyTransfer { restrictions }),
            )
    }
}

struct SecurityPolicyAttribute {
    restrictions: Arc<RestrictionTable>,
}

impl AttributeAccessor for SecurityPolicyAttribute {
    fn get(&self, request: &AccessRequest) -> Result<DataObject, DataAccessResult> {
        let policy = self
            .restrictions
            .get(request.client_id)
            .map(|suite| suite.security_policy().id())
            .unwrap_or(0);
        Ok(DataObject::Enumerate(policy))
    }
}

/// `global_key_transfer`: array of { key_id: enum, key_wrapped: octet-string }
struct GlobalKeyTransfer {
    restrictions: Arc<RestrictionTable>,
}

impl GlobalKeyTransfer {
    fn parse(parameters: &DataObject) -> Option<Vec<(KeyId, &[u8])>> {
        parameters
            .as_array()
            .ok()?
            .iter()
            .map(|entry| {
                let fields = entry.as_structure().ok()?;
                let [key_id, wrapped] = fields else {
                    return None;
                };
                let key_id = match key_id {
                    DataObject::Enumerate(id) => KeyId::from_id(*id).ok()?,
                    _ => return None,
                };
                Some((key_id, wrapped.as_octet_string().ok()?))
            })
            .collect()
    }
}

impl MethodAccessor for GlobalKeyTransfer {
    fn invoke(
        &self,
        request: &AccessRequest,
        parameters: Option<DataObject>,
    ) -> Result<Option<DataObject>, ActionResult> {
        let suite = self
            .restrictions
            .get(request.client_id)
            .ok_or(ActionResult::ReadWriteDenied)?;
        let master_key = suite.master_key().ok_or_else(|| {
            log::warn!("Key transfer for client {} without a master key", request.client_id);
            ActionResult::OtherReason
        })?;
        let keys = parameters
            .as_ref()
            .and_then(Self::parse)
            .filter(|keys| !keys.is_empty())
            .ok_or(ActionResult::TypeUnmatched)?;

        let mut encryption_key = None;
        let mut authentication_key = None;
        for (key_id, wrapped) in keys {
            let key = unwrap_aes_rfc3394_key(master_key, wrapped).map_err(|e| {
                log::warn!("Key transfer for client {} rejected: {}", request.client_id, e);
                ActionResult::OtherReason
            })?;
            match key_id {
                KeyId::GlobalUnicastEncryptionKey => encryption_key = Some(key),
                KeyId::AuthenticationKey => authentication_key = Some(key),
                KeyId::GlobalBroadcastEncryptionKey => return Err(ActionResult::OtherReason),
            }
        }

        let next = suite
            .with_replaced_keys(encryption_key, authentication_key)
            .map_err(|_| ActionResult::OtherReason)?;
        self.restrictions
            .replace(request.client_id, next)
            .map_err(|_| ActionResult::OtherReason)?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlms_security::utils::wrap_aes_rfc3394_key;
    use dlms_security::{AuthenticationMechanism, EncryptionMechanism, SecurityPolicy, SecuritySuite};

    const MASTER_KEY: [u8; 16] = [0x33; 16];

    fn table() -> Arc<RestrictionTable> {
        let table = Arc::new(RestrictionTable::new());
        table.insert(
            1,
            SecuritySuite::builder()
                .set_security_policy(SecurityPolicy::AuthenticatedAndEncrypted)
                .set_encryption_mechanism(EncryptionMechanism::AesGcm128)
                .set_authentication_mechanism(AuthenticationMechanism::HlsGmac)
                .set_global_unicast_encryption_key(vec![0x11; 16])
                .set_authentication_key(vec![0x22; 16])
                .set_master_key(MASTER_KEY.to_vec())
                .build()
                .unwrap(),
        );
        table
    }

    fn key_entry(key_id: u8, key: &[u8]) -> DataObject {
        DataObject::Structure(vec![
            DataObject::Enumerate(key_id),
            DataObject::OctetString(wrap_aes_rfc3394_key(&MASTER_KEY, key).unwrap()),
        ])
    }

    fn transfer(object: &CosemObject, client_id: u16, parameters: DataObject) -> Result<Option<DataObject>, ActionResult> {
        let request = AccessRequest::new(1, client_id, 0).authenticated(true);
        object
            .method(SecuritySetup::METHOD_GLOBAL_KEY_TRANSFER)
            .unwrap()
            .accessor
            .invoke(&request, Some(parameters))
    }

    #[test]
    fn test_key_transfer_replaces_suite() {
        let table = table();
        let before = table.get(1).unwrap();
        let object = SecuritySetup::object(Arc::clone(&table), SystemTitle::default());

        let parameters = DataObject::Array(vec![key_entry(0, &[0x44; 16]), key_entry(2, &[0x55; 16])]);
        assert_eq!(transfer(&object, 1, parameters), Ok(None));

        let after = table.get(1).unwrap();
        assert_eq!(after.global_unicast_encryption_key(), Some(&[0x44; 16][..]));
        assert_eq!(after.authentication_key(), Some(&[0x55; 16][..]));
        assert_eq!(before.global_unicast_encryption_key(), Some(&[0x11; 16][..]));
    }

    #[test]
    fn test_key_transfer_rejections() {
        let table = table();
        let object = SecuritySetup::object(Arc::clone(&table), SystemTitle::default());

        let wrong_kek = DataObject::Array(vec![DataObject::Structure(vec![
            DataObject::Enumerate(0),
            DataObject::OctetString(wrap_aes_rfc3394_key(&[0x99; 16], &[0x44; 16]).unwrap()),
        ])]);
        assert_eq!(transfer(&object, 1, wrong_kek), Err(ActionResult::OtherReason));
        assert_eq!(transfer(&object, 1, DataObject::Unsigned8(1)), Err(ActionResult::TypeUnmatched));
        assert_eq!(
            transfer(&object, 9, DataObject::Array(vec![key_entry(0, &[0x44; 16])])),
            Err(ActionResult::ReadWriteDenied)
        );
        assert_eq!(table.get(1).unwrap().global_unicast_encryption_key(), Some(&[0x11; 16][..]));
    }

    #[test]
    fn test_security_policy_attribute() {
        let object = SecuritySetup::object(table(), SystemTitle::new(*b"SERVER01"));
        let policy = object.attribute(SecuritySetup::ATTR_SECURITY_POLICY).unwrap();
        assert_eq!(policy.mode, AttributeAccessMode::Read);
        assert_eq!(
            policy.accessor.get(&AccessRequest::new(1, 1, 0)),
            Ok(DataObject::Enumerate(SecurityPolicy::AuthenticatedAndEncrypted.id()))
        );
        assert_eq!(policy.accessor.get(&AccessRequest::new(1, 16, 0)), Ok(DataObject::Enumerate(0)));
        let title = object.attribute(SecuritySetup::ATTR_SERVER_SYSTEM_TITLE).unwrap();
        assert_eq!(
            title.accessor.get(&AccessRequest::new(1, 1, 0)),
            Ok(DataObject::OctetString(b"SERVER01".to_vec()))
        );
    }
}
