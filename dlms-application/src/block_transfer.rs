//! Block transfer of oversized GET, ACTION and READ results
//!
//! The sender encodes a result once and hands the bytes to [`Fragments`],
//! which cuts them into blocks on demand. Block `n + 1` may only be sent after
//! the peer acknowledged block `n`. The receiving side appends blocks to a
//! [`BlockAssembler`] until the last one arrives.

use dlms_core::{DlmsError, DlmsResult};
use std::io;

/// Envelope bytes a glo-ciphered response adds on top of the plain PDU
pub const CIPHER_OVERHEAD: usize = 21;

/// Services able to split a result into blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockService {
    Get,
    Action,
    Read,
}

impl BlockService {
    /// Per-PDU header bytes, ciphering included where it applies.
    pub const fn overhead(self, ciphered: bool) -> usize {
        let cipher = if ciphered { CIPHER_OVERHEAD } else { 0 };
        match self {
            // Already sized for the envelope.
            BlockService::Get => 35,
            BlockService::Action => 10 + cipher,
            BlockService::Read => 15 + cipher,
        }
    }

    /// Payload bytes that fit into one block under `max_pdu_size`.
    ///
    /// # Errors
    /// `InvalidData` when the PDU size leaves no room for data.
    pub fn block_size(self, max_pdu_size: u16, ciphered: bool) -> DlmsResult<usize> {
        let overhead = self.overhead(ciphered);
        match (max_pdu_size as usize).checked_sub(overhead) {
            Some(size) if size > 0 => Ok(size),
            _ => Err(DlmsError::InvalidData(format!(
                "Max PDU size {} leaves no room for a {:?} block",
                max_pdu_size, self
            ))),
        }
    }

    /// Smallest max PDU size that leaves room for a block of every service.
    pub fn min_pdu_size(ciphered: bool) -> u16 {
        let largest = [BlockService::Get, BlockService::Action, BlockService::Read]
            .into_iter()
            .map(|service| service.overhead(ciphered))
            .max()
            .unwrap_or_default();
        largest as u16 + 1
    }

    /// Whether `encoded_len` bytes must go out in blocks.
    pub fn needs_block_transfer(self, encoded_len: usize, max_pdu_size: u16, ciphered: bool) -> bool {
        encoded_len + self.overhead(ciphered) > max_pdu_size as usize
    }
}

/// One chunk of a fragmented result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block<'a> {
    /// Starts at 1
    pub number: u32,
    pub last: bool,
    pub data: &'a [u8],
}

/// Lazy, restartable partition of an encoded result into blocks
#[derive(Debug, Clone)]
pub struct Fragments {
    data: Vec<u8>,
    block_size: usize,
    offset: usize,
    sent: u32,
}

impl Fragments {
    pub fn new(data: Vec<u8>, block_size: usize) -> DlmsResult<Self> {
        if block_size == 0 {
            return Err(DlmsError::InvalidData("Block size must be positive".to_string()));
        }
        Ok(Self {
            data,
            block_size,
            offset: 0,
            sent: 0,
        })
    }

    /// Total number of blocks the data splits into.
    pub fn block_count(&self) -> u32 {
        self.data.len().div_ceil(self.block_size).max(1) as u32
    }

    /// Number of the last block handed out, 0 before the first.
    pub fn last_sent(&self) -> u32 {
        self.sent
    }

    pub fn is_finished(&self) -> bool {
        self.sent > 0 && self.offset >= self.data.len()
    }

    /// Next block, or `None` once the last block has been produced.
    ///
    /// Empty data yields a single empty last block.
    pub fn next_block(&mut self) -> Option<Block<'_>> {
        if self.is_finished() {
            return None;
        }
        let start = self.offset;
        let end = (start + self.block_size).min(self.data.len());
        self.offset = end;
        self.sent += 1;
        Some(Block {
            number: self.sent,
            last: end >= self.data.len(),
            data: &self.data[start..end],
        })
    }

    /// Rewind to before the first block.
    pub fn restart(&mut self) {
        self.offset = 0;
        self.sent = 0;
    }

    /// Check the block number a follow-up request acknowledges.
    ///
    /// # Errors
    /// An I/O error of kind `InvalidData` when it is not the last block sent.
    pub fn check_acknowledgement(&self, block_number: u32) -> DlmsResult<()> {
        if block_number != self.sent {
            log::warn!(
                "Block transfer aborted: peer acknowledged block {} but {} was sent",
                block_number,
                self.sent
            );
            return Err(DlmsError::Connection(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Acknowledged block {} does not match sent block {}",
                    block_number, self.sent
                ),
            )));
        }
        Ok(())
    }
}

/// Client-side reassembly of consecutive blocks
#[derive(Debug, Default)]
pub struct BlockAssembler {
    data: Vec<u8>,
    expected: u32,
    complete: bool,
}

impl BlockAssembler {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            expected: 1,
            complete: false,
        }
    }

    /// Block number to acknowledge in the next follow-up request.
    pub fn last_received(&self) -> u32 {
        self.expected.saturating_sub(1)
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Append one block, returning whether it was the last.
    ///
    /// # Errors
    /// `Protocol` for a block that is out of sequence or arrives after the
    /// last one.
    pub fn push(&mut self, block_number: u32, last: bool, data: &[u8]) -> DlmsResult<bool> {
        if self.complete {
            return Err(DlmsError::Protocol(format!(
                "Block {} received after the last block",
                block_number
            )));
        }
        if block_number != self.expected {
            return Err(DlmsError::Protocol(format!(
                "Expected block {}, received {}",
                self.expected, block_number
            )));
        }
        self.data.extend_from_slice(data);
        self.expected += 1;
        self.complete = last;
        Ok(last)
    }

    /// The reassembled bytes once the last block has arrived.
    pub fn into_data(self) -> DlmsResult<Vec<u8>> {
        if !self.complete {
            return Err(DlmsError::Protocol("Block transfer incomplete".to_string()));
        }
        Ok(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size_per_service() {
        assert_eq!(BlockService::Get.block_size(256, false).unwrap(), 221);
        assert_eq!(BlockService::Get.block_size(256, true).unwrap(), 221);
        assert_eq!(BlockService::Action.block_size(256, false).unwrap(), 246);
        assert_eq!(BlockService::Action.block_size(256, true).unwrap(), 225);
        assert_eq!(BlockService::Read.block_size(256, true).unwrap(), 220);
        assert!(BlockService::Get.block_size(35, false).is_err());
        assert!(BlockService::Read.block_size(10, false).is_err());
    }

    #[test]
    fn test_min_pdu_size_fits_a_block_of_every_service() {
        for ciphered in [false, true] {
            let min = BlockService::min_pdu_size(ciphered);
            for service in [BlockService::Get, BlockService::Action, BlockService::Read] {
                assert!(service.block_size(min, ciphered).unwrap() >= 1);
            }
        }
        assert_eq!(BlockService::min_pdu_size(false), 36);
        assert_eq!(BlockService::min_pdu_size(true), 37);
        assert!(BlockService::Get.block_size(35, false).is_err());
        assert!(BlockService::Read.block_size(36, true).is_err());
    }

    #[test]
    fn test_needs_block_transfer() {
        assert!(!BlockService::Get.needs_block_transfer(221, 256, false));
        assert!(BlockService::Get.needs_block_transfer(222, 256, false));
        assert!(BlockService::Action.needs_block_transfer(230, 256, true));
    }

    #[test]
    fn test_blocks_concatenate_to_the_encoding() {
        let data: Vec<u8> = (0..=250).collect();
        let mut fragments = Fragments::new(data.clone(), 100).unwrap();
        assert_eq!(fragments.block_count(), 3);

        let mut joined = Vec::new();
        let mut numbers = Vec::new();
        while let Some(block) = fragments.next_block() {
            numbers.push((block.number, block.last, block.data.len()));
            joined.extend_from_slice(block.data);
        }
        assert_eq!(numbers, vec![(1, false, 100), (2, false, 100), (3, true, 51)]);
        assert_eq!(joined, data);
        assert!(fragments.next_block().is_none());

        fragments.restart();
        assert_eq!(fragments.next_block().map(|b| b.number), Some(1));
    }

    #[test]
    fn test_exact_multiple_and_empty_data() {
        let mut fragments = Fragments::new(vec![0xAA; 200], 100).unwrap();
        assert!(!fragments.next_block().unwrap().last);
        assert!(fragments.next_block().unwrap().last);
        assert!(fragments.next_block().is_none());

        let mut empty = Fragments::new(Vec::new(), 100).unwrap();
        let block = empty.next_block().unwrap();
        assert!(block.last && block.data.is_empty());
        assert!(empty.next_block().is_none());
        assert!(Fragments::new(vec![1], 0).is_err());
    }

    #[test]
    fn test_mismatched_acknowledgement_aborts() {
        let mut fragments = Fragments::new(vec![0; 300], 100).unwrap();
        fragments.next_block();
        fragments.check_acknowledgement(1).unwrap();
        match fragments.check_acknowledgement(2) {
            Err(DlmsError::Connection(e)) => assert_eq!(e.kind(), io::ErrorKind::InvalidData),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_assembler_checks_sequence() {
        let mut assembler = BlockAssembler::new();
        assert!(!assembler.push(1, false, &[1, 2]).unwrap());
        assert_eq!(assembler.last_received(), 1);
        assert!(assembler.push(3, false, &[5]).is_err());
        assert!(assembler.push(2, true, &[3, 4]).unwrap());
        assert!(assembler.push(3, true, &[5]).is_err());
        assert_eq!(assembler.into_data().unwrap(), vec![1, 2, 3, 4]);

        let mut partial = BlockAssembler::new();
        partial.push(1, false, &[1]).unwrap();
        assert!(partial.into_data().is_err());
    }
}
