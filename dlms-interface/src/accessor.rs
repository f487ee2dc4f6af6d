//! Accessor traits that bind attributes and methods to their values
//!
//! An object registers one accessor per attribute and per method. Accessors
//! are called synchronously from the association task and must do their own
//! locking when they share state.

use dlms_application::pdu::{ActionResult, DataAccessResult, SelectiveAccessDescriptor};
use dlms_core::DataObject;
use dlms_security::SecurityPolicy;

#[cfg(test)]
use mockall::automock;

/// Who is asking, and under which protection
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRequest {
    pub logical_device_id: u16,
    pub client_id: u16,
    pub connection_id: u64,
    pub authenticated: bool,
    pub security_policy: SecurityPolicy,
    /// Selective access of a GET or READ
    pub selection: Option<SelectiveAccessDescriptor>,
}

impl AccessRequest {
    pub fn new(logical_device_id: u16, client_id: u16, connection_id: u64) -> Self {
        Self {
            logical_device_id,
            client_id,
            connection_id,
            authenticated: false,
            security_policy: SecurityPolicy::Nothing,
            selection: None,
        }
    }

    pub fn authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }

    pub fn with_security_policy(mut self, policy: SecurityPolicy) -> Self {
        self.security_policy = policy;
        self
    }

    pub fn with_selection(mut self, selection: Option<SelectiveAccessDescriptor>) -> Self {
        self.selection = selection;
        self
    }
}

/// Reads and writes one attribute
#[cfg_attr(test, automock)]
pub trait AttributeAccessor: Send + Sync {
    fn get(&self, request: &AccessRequest) -> Result<DataObject, DataAccessResult>;

    /// Attributes without a setter answer `ReadWriteDenied`.
    fn set(&self, _request: &AccessRequest, _value: DataObject) -> Result<(), DataAccessResult> {
        Err(DataAccessResult::ReadWriteDenied)
    }
}

/// Invokes one method
#[cfg_attr(test, automock)]
pub trait MethodAccessor: Send + Sync {
    fn invoke(
        &self,
        request: &AccessRequest,
        parameters: Option<DataObject>,
    ) -> Result<Option<DataObject>, ActionResult>;
}

/// Attribute holding a value fixed at registration
#[derive(Debug, Clone)]
pub struct ConstantAttribute(pub DataObject);

impl AttributeAccessor for ConstantAttribute {
    fn get(&self, _request: &AccessRequest) -> Result<DataObject, DataAccessResult> {
        Ok(self.0.clone())
    }
}
