//! Association state machine for DLMS/COSEM connections
//!
//! ```text
//! Disconnected -> Negotiating -> AuthNone ------------> Established -> Releasing -> Closed
//!                            \-> AuthChallengePending -/
//! ```
//!
//! Any state may fall straight to `Closed` on an I/O failure or a malformed
//! message. `Closed` is terminal.

use dlms_core::{DlmsError, DlmsResult};
use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssociationState {
    /// Transport open, no AARQ seen yet
    #[default]
    Disconnected,
    /// AARQ received (server) or sent (client), AARE pending
    Negotiating,
    /// Accepted without a challenge (NONE or LOW)
    AuthNone,
    /// Accepted under HLS; only the reply-to-HLS method is allowed until the
    /// client has proven key possession
    AuthChallengePending,
    /// Normal operation
    Established,
    /// RLRQ exchanged, transport about to close
    Releasing,
    Closed,
}

impl AssociationState {
    /// Validate `self -> next` and return `next`.
    ///
    /// # Errors
    /// `Protocol` for a transition the state machine does not have.
    pub fn transition(self, next: AssociationState) -> DlmsResult<AssociationState> {
        use AssociationState::*;
        let allowed = match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Disconnected, Negotiating) => true,
            (Negotiating, AuthNone | AuthChallengePending) => true,
            (AuthNone | AuthChallengePending, Established) => true,
            (Established, Releasing) => true,
            _ => false,
        };
        if allowed {
            Ok(next)
        } else {
            Err(DlmsError::Protocol(format!(
                "Invalid association transition {} -> {}",
                self, next
            )))
        }
    }

    /// Whether data-access requests may be served.
    pub const fn is_established(&self) -> bool {
        matches!(self, Self::Established)
    }

    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Negotiating => "Negotiating",
            Self::AuthNone => "AuthNone",
            Self::AuthChallengePending => "AuthChallengePending",
            Self::Established => "Established",
            Self::Releasing => "Releasing",
            Self::Closed => "Closed",
        }
    }
}

impl Display for AssociationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AssociationState::*;

    #[test]
    fn test_handshake_paths() {
        let state = Disconnected.transition(Negotiating).unwrap();
        assert_eq!(state.transition(AuthNone).unwrap().transition(Established).unwrap(), Established);
        let pending = Negotiating.transition(AuthChallengePending).unwrap();
        assert_eq!(pending.transition(Established).unwrap(), Established);
        assert_eq!(Established.transition(Releasing).unwrap(), Releasing);
        assert_eq!(Releasing.transition(Closed).unwrap(), Closed);
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(Disconnected.transition(Established).is_err());
        assert!(Negotiating.transition(Established).is_err());
        assert!(AuthChallengePending.transition(Releasing).is_err());
        assert!(Established.transition(Negotiating).is_err());
    }

    #[test]
    fn test_closed_is_terminal_and_reachable() {
        for state in [Disconnected, Negotiating, AuthNone, AuthChallengePending, Established, Releasing] {
            assert_eq!(state.transition(Closed).unwrap(), Closed);
        }
        assert!(Closed.transition(Closed).is_err());
        assert!(Closed.transition(Disconnected).is_err());
        assert!(matches!(Closed.transition(Negotiating), Err(DlmsError::Protocol(_))));
    }

    #[test]
    fn test_display_state() {
        assert_eq!(AuthChallengePending.to_string(), "AuthChallengePending");
        assert!(Established.is_established());
        assert!(Closed.is_closed());
    }
}
