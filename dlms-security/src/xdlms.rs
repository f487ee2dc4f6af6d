//! xDLMS security state: system titles and frame counters
//!
//! The system title is the 8-byte identity placed in the first half of
//! every AES-GCM initialization vector; the frame counter fills the other
//! four bytes. An IV must never repeat under one key, so each direction of
//! an association keeps a strictly increasing counter and the receiver
//! rejects any counter it has already seen.

use crate::error::{DlmsError, DlmsResult};
use std::fmt;

/// System Title
///
/// An 8-byte identifier that uniquely identifies a DLMS/COSEM device, sent as
/// the calling/responding AP title during association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SystemTitle {
    value: [u8; 8],
}

impl SystemTitle {
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self { value: bytes }
    }

    /// # Errors
    /// Returns error if bytes length is not 8
    pub fn from_slice(bytes: &[u8]) -> DlmsResult<Self> {
        let value: [u8; 8] = bytes.try_into().map_err(|_| {
            DlmsError::InvalidData(format!("System Title must be 8 bytes, got {}", bytes.len()))
        })?;
        Ok(Self { value })
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.value
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.value
    }

    /// AES-GCM IV: system title followed by the big-endian frame counter.
    pub fn initialization_vector(&self, frame_counter: u32) -> [u8; 12] {
        let mut iv = [0u8; 12];
        iv[..8].copy_from_slice(&self.value);
        iv[8..].copy_from_slice(&frame_counter.to_be_bytes());
        iv
    }
}

impl fmt::Display for SystemTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.value {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Outgoing frame counter of one association
///
/// Owned by the single task driving the association, so it needs no locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameCounter {
    next: u32,
}

impl FrameCounter {
    /// Counter whose first value is 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn with_initial(initial: u32) -> Self {
        Self { next: initial }
    }

    /// Value the next call to [`FrameCounter::next_value`] returns.
    pub fn peek(&self) -> u32 {
        self.next
    }

    /// Consume one counter value.
    ///
    /// # Errors
    /// `Security` once the 32-bit space is exhausted; the keys must be
    /// changed before any further ciphered message is sent.
    pub fn next_value(&mut self) -> DlmsResult<u32> {
        let value = self.next;
        self.next = self.next.checked_add(1).ok_or_else(|| {
            DlmsError::Security("Frame counter exhausted".to_string())
        })?;
        Ok(value)
    }
}

impl Default for FrameCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Incoming frame counter check of one association
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayGuard {
    last_accepted: Option<u32>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self { last_accepted: None }
    }

    pub fn last_accepted(&self) -> Option<u32> {
        self.last_accepted
    }

    /// Lowest counter value the peer may use next.
    pub fn next_expected(&self) -> u32 {
        self.last_accepted.map_or(1, |last| last.saturating_add(1))
    }

    /// Accept `frame_counter` if it is above every counter seen so far.
    ///
    /// # Errors
    /// `Cipher` when the counter repeats or goes backwards.
    pub fn accept(&mut self, frame_counter: u32) -> DlmsResult<()> {
        if let Some(last) = self.last_accepted {
            if frame_counter <= last {
                return Err(DlmsError::Cipher(format!(
                    "Replayed frame counter {} (last accepted {})",
                    frame_counter, last
                )));
            }
        }
        self.last_accepted = Some(frame_counter);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_title_iv() {
        let title = SystemTitle::new([0x4D, 0x4D, 0x4D, 0, 0, 0, 0, 1]);
        assert_eq!(
            title.initialization_vector(0x0102_0304),
            [0x4D, 0x4D, 0x4D, 0, 0, 0, 0, 1, 1, 2, 3, 4]
        );
        assert_eq!(title.to_string(), "4D4D4D0000000001");
        assert!(SystemTitle::from_slice(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_frame_counter_is_monotonic() {
        let mut counter = FrameCounter::new();
        assert_eq!(counter.next_value().unwrap(), 1);
        assert_eq!(counter.next_value().unwrap(), 2);
        assert_eq!(counter.peek(), 3);

        let mut last = FrameCounter::with_initial(u32::MAX);
        assert!(last.next_value().is_err());
    }

    #[test]
    fn test_replay_guard_rejects_reuse() {
        let mut guard = ReplayGuard::new();
        assert_eq!(guard.next_expected(), 1);
        guard.accept(5).unwrap();
        assert_eq!(guard.next_expected(), 6);
        assert!(matches!(guard.accept(5), Err(DlmsError::Cipher(_))));
        assert!(guard.accept(4).is_err());
        guard.accept(9).unwrap();
        assert_eq!(guard.last_accepted(), Some(9));
    }
}
