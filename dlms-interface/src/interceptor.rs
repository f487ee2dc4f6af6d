//! Hook around every attribute and method access of a logical device
//!
//! The interceptor sees the resolved target before the accessor runs and
//! decides whether to call `proceed`, replace the outcome, or both.

use dlms_application::pdu::{
    ActionResult, CosemAttributeDescriptor, CosemMethodDescriptor, DataAccessResult,
};
use dlms_core::DataObject;
use dlms_security::SecurityPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationTarget {
    Get(CosemAttributeDescriptor),
    Set(CosemAttributeDescriptor),
    Action(CosemMethodDescriptor),
}

#[derive(Debug, Clone, Copy)]
pub struct InvocationContext<'a> {
    pub target: InvocationTarget,
    /// Value of a SET or parameters of an ACTION
    pub parameters: Option<&'a DataObject>,
    pub security_policy: SecurityPolicy,
    pub connection_id: u64,
    pub client_id: u16,
}

/// Result of one access, shaped by its target
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    Get(Result<DataObject, DataAccessResult>),
    Set(Result<(), DataAccessResult>),
    Action(Result<Option<DataObject>, ActionResult>),
}

impl InvocationOutcome {
    /// Outcome of a GET; an outcome of another shape counts as `OtherReason`.
    pub fn into_get(self) -> Result<DataObject, DataAccessResult> {
        match self {
            InvocationOutcome::Get(result) => result,
            other => {
                log::warn!("Interceptor returned {:?} for a GET", other);
                Err(DataAccessResult::OtherReason)
            }
        }
    }

    pub fn into_set(self) -> Result<(), DataAccessResult> {
        match self {
            InvocationOutcome::Set(result) => result,
            other => {
                log::warn!("Interceptor returned {:?} for a SET", other);
                Err(DataAccessResult::OtherReason)
            }
        }
    }

    pub fn into_action(self) -> Result<Option<DataObject>, ActionResult> {
        match self {
            InvocationOutcome::Action(result) => result,
            other => {
                log::warn!("Interceptor returned {:?} for an ACTION", other);
                Err(ActionResult::OtherReason)
            }
        }
    }
}

pub trait Interceptor: Send + Sync {
    /// Wrap one access. `proceed` runs the access checks and the accessor.
    fn intercept(
        &self,
        context: &InvocationContext<'_>,
        proceed: &mut dyn FnMut() -> InvocationOutcome,
    ) -> InvocationOutcome;
}

/// Run `proceed` through `interceptor` when there is one.
pub fn intercept(
    interceptor: Option<&dyn Interceptor>,
    context: &InvocationContext<'_>,
    mut proceed: impl FnMut() -> InvocationOutcome,
) -> InvocationOutcome {
    match interceptor {
        Some(interceptor) => interceptor.intercept(context, &mut proceed),
        None => proceed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlms_core::ObisCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DenyWrites {
        seen: AtomicUsize,
    }

    impl Interceptor for DenyWrites {
        fn intercept(
            &self,
            context: &InvocationContext<'_>,
            proceed: &mut dyn FnMut() -> InvocationOutcome,
        ) -> InvocationOutcome {
            self.seen.fetch_add(1, Ordering::SeqCst);
            match context.target {
                InvocationTarget::Set(_) => InvocationOutcome::Set(Err(DataAccessResult::ReadWriteDenied)),
                _ => proceed(),
            }
        }
    }

    fn context(target: InvocationTarget) -> InvocationContext<'static> {
        InvocationContext {
            target,
            parameters: None,
            security_policy: SecurityPolicy::Nothing,
            connection_id: 3,
            client_id: 16,
        }
    }

    #[test]
    fn test_interceptor_wraps_and_short_circuits() {
        let descriptor = CosemAttributeDescriptor::new(1, ObisCode::new(0, 0, 96, 1, 0, 255), 2);
        let interceptor = DenyWrites { seen: AtomicUsize::new(0) };
        let mut calls = 0;

        let outcome = intercept(Some(&interceptor), &context(InvocationTarget::Get(descriptor)), || {
            calls += 1;
            InvocationOutcome::Get(Ok(DataObject::Unsigned8(1)))
        });
        assert_eq!(outcome.into_get(), Ok(DataObject::Unsigned8(1)));

        let outcome = intercept(Some(&interceptor), &context(InvocationTarget::Set(descriptor)), || {
            calls += 1;
            InvocationOutcome::Set(Ok(()))
        });
        assert_eq!(outcome.into_set(), Err(DataAccessResult::ReadWriteDenied));
        assert_eq!(calls, 1);
        assert_eq!(interceptor.seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_without_interceptor_proceeds() {
        let method = CosemMethodDescriptor::new(15, ObisCode::new(0, 0, 40, 0, 0, 255), 1);
        let outcome = intercept(None, &context(InvocationTarget::Action(method)), || {
            InvocationOutcome::Action(Ok(None))
        });
        assert_eq!(outcome.clone().into_action(), Ok(None));
        assert_eq!(outcome.into_get(), Err(DataAccessResult::OtherReason));
    }
}
