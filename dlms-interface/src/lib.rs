//! COSEM object model for DLMS/COSEM servers
//!
//! Objects are registered as a class id, a logical name and one accessor
//! per attribute and method, each guarded by an access mode. The handful of
//! interface classes the association engine needs are provided here: Data,
//! Association LN and Security Setup.

pub mod access;
pub mod accessor;
pub mod association_ln;
pub mod data;
pub mod error;
pub mod interceptor;
pub mod object;
pub mod restrictions;
pub mod security_setup;

pub use access::{AttributeAccessMode, MethodAccessMode};
pub use accessor::{AccessRequest, AttributeAccessor, ConstantAttribute, MethodAccessor};
pub use association_ln::AssociationLn;
pub use data::{Data, DataValue};
pub use error::{DlmsError, DlmsResult};
pub use interceptor::{Interceptor, InvocationContext, InvocationOutcome, InvocationTarget};
pub use object::{AttributeEntry, CosemObject, MethodEntry, ShortNameMember};
pub use restrictions::RestrictionTable;
pub use security_setup::SecuritySetup;
