//! ISO-ACSE field types

use crate::error::{DlmsError, DlmsResult};

/// `{joint-iso-ccitt(2) country(16) country-name(756) identified-organization(5) DLMS-UA(8) application-context(1)}`
pub const APPLICATION_CONTEXT_PREFIX: &[u32] = &[2, 16, 756, 5, 8, 1];

/// `{... DLMS-UA(8) authentication-mechanism-name(2)}`
pub const MECHANISM_NAME_PREFIX: &[u32] = &[2, 16, 756, 5, 8, 2];

/// Application context of an association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextId {
    LogicalNameReferencingNoCiphering = 1,
    ShortNameReferencingNoCiphering = 2,
    LogicalNameReferencingWithCiphering = 3,
    ShortNameReferencingWithCiphering = 4,
}

impl ContextId {
    pub fn new(logical_name: bool, ciphered: bool) -> Self {
        match (logical_name, ciphered) {
            (true, false) => ContextId::LogicalNameReferencingNoCiphering,
            (false, false) => ContextId::ShortNameReferencingNoCiphering,
            (true, true) => ContextId::LogicalNameReferencingWithCiphering,
            (false, true) => ContextId::ShortNameReferencingWithCiphering,
        }
    }

    /// Map an application-context-name OID, `None` when it is not a DLMS context.
    pub fn from_oid(arcs: &[u32]) -> Option<Self> {
        match arcs.strip_prefix(APPLICATION_CONTEXT_PREFIX)? {
            [1] => Some(ContextId::LogicalNameReferencingNoCiphering),
            [2] => Some(ContextId::ShortNameReferencingNoCiphering),
            [3] => Some(ContextId::LogicalNameReferencingWithCiphering),
            [4] => Some(ContextId::ShortNameReferencingWithCiphering),
            _ => None,
        }
    }

    pub fn oid(self) -> Vec<u32> {
        let mut arcs = APPLICATION_CONTEXT_PREFIX.to_vec();
        arcs.push(self as u32);
        arcs
    }

    pub fn is_logical_name(self) -> bool {
        matches!(
            self,
            ContextId::LogicalNameReferencingNoCiphering
                | ContextId::LogicalNameReferencingWithCiphering
        )
    }

    pub fn is_ciphered(self) -> bool {
        matches!(
            self,
            ContextId::LogicalNameReferencingWithCiphering
                | ContextId::ShortNameReferencingWithCiphering
        )
    }
}

/// Mechanism id carried as the last arc of a mechanism-name OID.
pub fn mechanism_oid(id: u32) -> Vec<u32> {
    let mut arcs = MECHANISM_NAME_PREFIX.to_vec();
    arcs.push(id);
    arcs
}

/// Mechanism id of a DLMS mechanism-name OID.
pub fn mechanism_id(arcs: &[u32]) -> Option<u32> {
    match arcs.strip_prefix(MECHANISM_NAME_PREFIX)? {
        [id] => Some(*id),
        _ => None,
    }
}

/// Association result of an AARE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociateResult {
    Accepted = 0,
    RejectedPermanent = 1,
    RejectedTransient = 2,
}

impl AssociateResult {
    pub fn from_value(value: u8) -> DlmsResult<Self> {
        match value {
            0 => Ok(AssociateResult::Accepted),
            1 => Ok(AssociateResult::RejectedPermanent),
            2 => Ok(AssociateResult::RejectedTransient),
            _ => Err(DlmsError::Asn1Encoding(format!(
                "Invalid AssociateResult value: {}",
                value
            ))),
        }
    }

    pub fn value(self) -> u8 {
        self as u8
    }
}

/// acse-service-user diagnostic values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcseServiceUserDiagnostic {
    Null = 0,
    NoReasonGiven = 1,
    ApplicationContextNameNotSupported = 2,
    AuthenticationMechanismNameNotRecognised = 11,
    AuthenticationMechanismNameRequired = 12,
    AuthenticationFailure = 13,
    AuthenticationRequired = 14,
}

impl AcseServiceUserDiagnostic {
    pub fn from_value(value: u8) -> DlmsResult<Self> {
        Ok(match value {
            0 => AcseServiceUserDiagnostic::Null,
            1 => AcseServiceUserDiagnostic::NoReasonGiven,
            2 => AcseServiceUserDiagnostic::ApplicationContextNameNotSupported,
            11 => AcseServiceUserDiagnostic::AuthenticationMechanismNameNotRecognised,
            12 => AcseServiceUserDiagnostic::AuthenticationMechanismNameRequired,
            13 => AcseServiceUserDiagnostic::AuthenticationFailure,
            14 => AcseServiceUserDiagnostic::AuthenticationRequired,
            _ => {
                return Err(DlmsError::Asn1Encoding(format!(
                    "Invalid acse-service-user diagnostic: {}",
                    value
                )));
            }
        })
    }

    pub fn value(self) -> u8 {
        self as u8
    }
}

/// result-source-diagnostic CHOICE of an AARE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociateSourceDiagnostic {
    ServiceUser(AcseServiceUserDiagnostic),
    /// acse-service-provider; 0 null, 1 no-reason-given, 2 no-common-acse-version
    ServiceProvider(u8),
}

impl Default for AssociateSourceDiagnostic {
    fn default() -> Self {
        AssociateSourceDiagnostic::ServiceUser(AcseServiceUserDiagnostic::Null)
    }
}

/// Release-request reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseRequestReason {
    Normal = 0,
    Urgent = 1,
    UserDefined = 30,
}

impl ReleaseRequestReason {
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(ReleaseRequestReason::Normal),
            1 => Some(ReleaseRequestReason::Urgent),
            30 => Some(ReleaseRequestReason::UserDefined),
            _ => None,
        }
    }

    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Release-response reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseResponseReason {
    Normal = 0,
    NotFinished = 1,
    UserDefined = 30,
}

impl ReleaseResponseReason {
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(ReleaseResponseReason::Normal),
            1 => Some(ReleaseResponseReason::NotFinished),
            30 => Some(ReleaseResponseReason::UserDefined),
            _ => None,
        }
    }

    /// Response reason mirrored from a release request.
    pub fn for_request(reason: Option<ReleaseRequestReason>) -> Self {
        match reason {
            Some(ReleaseRequestReason::Urgent) => ReleaseResponseReason::NotFinished,
            Some(ReleaseRequestReason::UserDefined) => ReleaseResponseReason::UserDefined,
            _ => ReleaseResponseReason::Normal,
        }
    }

    pub fn value(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_id_oid_mapping() {
        let oid = ContextId::LogicalNameReferencingWithCiphering.oid();
        assert_eq!(oid, vec![2, 16, 756, 5, 8, 1, 3]);
        assert_eq!(
            ContextId::from_oid(&oid),
            Some(ContextId::LogicalNameReferencingWithCiphering)
        );
        assert!(ContextId::from_oid(&[2, 16, 756, 5, 8, 1, 9]).is_none());
        assert!(ContextId::from_oid(&[1, 0, 17, 0, 0, 128, 0, 1]).is_none());
        assert!(ContextId::new(false, true).is_ciphered());
        assert!(!ContextId::new(false, true).is_logical_name());
    }

    #[test]
    fn test_release_reason_mapping() {
        assert_eq!(
            ReleaseResponseReason::for_request(Some(ReleaseRequestReason::Urgent)),
            ReleaseResponseReason::NotFinished
        );
        assert_eq!(
            ReleaseResponseReason::for_request(Some(ReleaseRequestReason::UserDefined)),
            ReleaseResponseReason::UserDefined
        );
        assert_eq!(
            ReleaseResponseReason::for_request(Some(ReleaseRequestReason::Normal)),
            ReleaseResponseReason::Normal
        );
        assert_eq!(ReleaseResponseReason::for_request(None), ReleaseResponseReason::Normal);
    }

    #[test]
    fn test_mechanism_id() {
        assert_eq!(mechanism_id(&mechanism_oid(5)), Some(5));
        assert_eq!(mechanism_id(&[2, 16, 756, 5, 8, 1, 5]), None);
    }
}
