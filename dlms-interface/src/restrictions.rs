//! Per-client security suites of a logical device
//!
//! Readers clone the `Arc` under a short read lock. A key change publishes a
//! whole new suite, so an association that already holds a snapshot keeps
//! the keys it started with.

use dlms_core::{DlmsError, DlmsResult};
use dlms_security::SecuritySuite;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct RestrictionTable {
    suites: RwLock<HashMap<u16, Arc<SecuritySuite>>>,
}

impl RestrictionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the suite `client_id` must associate with.
    pub fn insert(&self, client_id: u16, suite: SecuritySuite) {
        self.suites
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client_id, Arc::new(suite));
    }

    pub fn get(&self, client_id: u16) -> Option<Arc<SecuritySuite>> {
        self.suites
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&client_id)
            .cloned()
    }

    /// Publish a replacement suite for an already known client.
    ///
    /// # Errors
    /// `AccessDenied` when the client has no entry.
    pub fn replace(&self, client_id: u16, suite: SecuritySuite) -> DlmsResult<()> {
        let mut suites = self.suites.write().unwrap_or_else(PoisonError::into_inner);
        match suites.get_mut(&client_id) {
            Some(entry) => {
                *entry = Arc::new(suite);
                log::info!("Security suite of client {} replaced", client_id);
                Ok(())
            }
            None => Err(DlmsError::AccessDenied(format!(
                "Client {} has no security restriction",
                client_id
            ))),
        }
    }

    /// A device without entries accepts every client unauthenticated.
    pub fn is_restricted(&self) -> bool {
        !self.suites.read().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    pub fn len(&self) -> usize {
        self.suites.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlms_security::{AuthenticationMechanism, SecurityPolicy};

    fn low_suite(password: &[u8]) -> SecuritySuite {
        SecuritySuite::builder()
            .set_security_policy(SecurityPolicy::Nothing)
            .set_authentication_mechanism(AuthenticationMechanism::Low)
            .set_password(password.to_vec())
            .build()
            .unwrap()
    }

    #[test]
    fn test_unrestricted_table() {
        let table = RestrictionTable::new();
        assert!(!table.is_restricted());
        assert!(table.get(16).is_none());
        assert!(table.replace(16, SecuritySuite::default()).is_err());
    }

    #[test]
    fn test_replace_keeps_old_snapshot() {
        let table = RestrictionTable::new();
        table.insert(17, low_suite(b"old"));
        let snapshot = table.get(17).unwrap();

        table.replace(17, low_suite(b"new")).unwrap();
        assert_eq!(snapshot.password(), Some(&b"old"[..]));
        assert_eq!(table.get(17).unwrap().password(), Some(&b"new"[..]));
        assert!(table.is_restricted());
        assert_eq!(table.len(), 1);
    }
}
