//! HDLC connection state machine

use crate::error::{DlmsError, DlmsResult};

/// HDLC connection state
///
/// ```text
/// Closed -> Connecting (SNRM sent or awaited)
/// Connecting -> Connected (UA exchanged)
/// Connected -> Closing (DISC sent)
/// Closing -> Closed (UA/DM received or timeout)
/// ```
///
/// Any state may drop to `Closed` on error or on a received DISC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HdlcConnectionState {
    #[default]
    Closed,
    Connecting,
    Connected,
    Closing,
}

impl HdlcConnectionState {
    /// Information frames may be exchanged
    pub fn is_ready(&self) -> bool {
        matches!(self, HdlcConnectionState::Connected)
    }

    pub fn can_close(&self) -> bool {
        !matches!(self, HdlcConnectionState::Closed)
    }

    /// Validate state transition
    pub fn validate_transition(&self, new_state: HdlcConnectionState) -> DlmsResult<()> {
        use HdlcConnectionState::*;
        let valid = matches!(
            (*self, new_state),
            (Closed, Connecting)
                | (Connecting, Connected)
                | (Connected, Connecting)
                | (Connected, Closing)
                | (_, Closed)
                | (Connected, Connected)
        );

        if valid {
            Ok(())
        } else {
            Err(DlmsError::Protocol(format!(
                "Invalid HDLC state transition: {:?} -> {:?}",
                self, new_state
            )))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HdlcConnectionState::Closed => "Closed",
            HdlcConnectionState::Connecting => "Connecting",
            HdlcConnectionState::Connected => "Connected",
            HdlcConnectionState::Closing => "Closing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let state = HdlcConnectionState::default();
        assert_eq!(state, HdlcConnectionState::Closed);
        assert!(state.validate_transition(HdlcConnectionState::Connecting).is_ok());
        assert!(state.validate_transition(HdlcConnectionState::Connected).is_err());
        assert!(HdlcConnectionState::Closing
            .validate_transition(HdlcConnectionState::Connected)
            .is_err());
        assert!(HdlcConnectionState::Connected
            .validate_transition(HdlcConnectionState::Closed)
            .is_ok());
        assert!(HdlcConnectionState::Connected.is_ready());
        assert!(!HdlcConnectionState::Closed.can_close());
    }
}
