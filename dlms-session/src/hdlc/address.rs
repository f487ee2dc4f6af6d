//! HDLC address types
//!
//! Each address byte carries seven bits, the least significant bit marks the
//! last byte. A client address is one byte. A server address is the upper
//! (logical device) address followed by the optional lower (physical) address,
//! for a total of 1, 2 or 4 bytes.

use crate::error::{DlmsError, DlmsResult};
use std::fmt;

/// Reserved HDLC addresses
pub mod reserved {
    /// Guaranteed to be received by no one
    pub const NO_STATION: u16 = 0x00;

    /// Client management process
    pub const CLIENT_MANAGEMENT_PROCESS: u16 = 0x01;

    /// Client public client
    pub const CLIENT_PUBLIC_CLIENT: u16 = 0x10;

    /// Client all station (broadcast)
    pub const CLIENT_ALL_STATION: u16 = 0x7F;

    /// Server upper management logical device
    pub const SERVER_UPPER_MANAGEMENT_LOGICAL_DEVICE: u16 = 0x01;

    /// Server upper all stations (1 byte)
    pub const SERVER_UPPER_ALL_STATIONS_1BYTE: u16 = 0x7F;

    /// Server upper all stations (2 byte)
    pub const SERVER_UPPER_ALL_STATIONS_2BYTE: u16 = 0x3FFF;
}

const ONE_BYTE_UPPER_BOUND: u16 = 0x7F;
const TWO_BYTE_UPPER_BOUND: u16 = 0x3FFF;

/// HDLC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HdlcAddress {
    byte_length: usize,
    logical_id: u16,
    physical_id: u16,
}

impl HdlcAddress {
    /// One-byte address (client side, or a server without lower address)
    pub fn new(logical_id: u16) -> DlmsResult<Self> {
        if logical_id > ONE_BYTE_UPPER_BOUND {
            return Err(DlmsError::InvalidData(format!(
                "One byte address exceeded upper bound of 0x{:02X}",
                ONE_BYTE_UPPER_BOUND
            )));
        }
        Ok(Self {
            byte_length: 1,
            logical_id,
            physical_id: 0,
        })
    }

    /// Server address with upper (logical) and lower (physical) part
    pub fn new_with_physical(logical_id: u16, physical_id: u16) -> DlmsResult<Self> {
        let logical_size = Self::address_size_of(logical_id)?;
        let physical_size = Self::address_size_of(physical_id)?;
        // A two-byte upper address only fits the four-byte form
        let byte_length = if physical_id == 0 && logical_size == 1 {
            1
        } else {
            logical_size.max(physical_size) * 2
        };

        Ok(Self {
            byte_length,
            logical_id,
            physical_id,
        })
    }

    fn address_size_of(address: u16) -> DlmsResult<usize> {
        if address <= ONE_BYTE_UPPER_BOUND {
            Ok(1)
        } else if address <= TWO_BYTE_UPPER_BOUND {
            Ok(2)
        } else {
            Err(DlmsError::InvalidData(format!(
                "Address 0x{:X} is out of upper bound 0x{:X}",
                address, TWO_BYTE_UPPER_BOUND
            )))
        }
    }

    pub fn logical_id(&self) -> u16 {
        self.logical_id
    }

    pub fn physical_id(&self) -> u16 {
        self.physical_id
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    /// Encode address to bytes
    pub fn encode(&self) -> Vec<u8> {
        let upper_length = self.byte_length.div_ceil(2);
        let lower_length = self.byte_length / 2;

        let mut result = Vec::with_capacity(self.byte_length);
        for i in (0..upper_length).rev() {
            result.push((((self.logical_id >> (7 * i)) & 0x7F) << 1) as u8);
        }
        for i in (0..lower_length).rev() {
            result.push((((self.physical_id >> (7 * i)) & 0x7F) << 1) as u8);
        }
        if let Some(last) = result.last_mut() {
            *last |= 1;
        }
        result
    }

    /// Decode an address from its 1, 2 or 4 encoded bytes
    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let seven = |b: u8| (b >> 1) as u16;
        let (logical_id, physical_id) = match *data {
            [a] => (seven(a), 0),
            [a, b] => (seven(a), seven(b)),
            [a, b, c, d] => ((seven(a) << 7) | seven(b), (seven(c) << 7) | seven(d)),
            _ => {
                return Err(DlmsError::FrameInvalid(format!(
                    "HDLC address has an invalid byte length of {}",
                    data.len()
                )));
            }
        };
        Ok(Self {
            byte_length: data.len(),
            logical_id,
            physical_id,
        })
    }

    /// Read the address at the start of `data`, returning it and its length.
    pub fn read_from(data: &[u8]) -> DlmsResult<(Self, usize)> {
        let length = data
            .iter()
            .take(4)
            .position(|b| b & 0x01 != 0)
            .map(|i| i + 1)
            .ok_or_else(|| DlmsError::FrameInvalid("HDLC address is illegal in frame".to_string()))?;
        Ok((Self::decode(&data[..length])?, length))
    }

    /// Check if this is an all-station (broadcast) address
    pub fn is_all_station(&self) -> bool {
        match self.byte_length {
            1 | 2 => self.logical_id == reserved::SERVER_UPPER_ALL_STATIONS_1BYTE,
            4 => self.logical_id == reserved::SERVER_UPPER_ALL_STATIONS_2BYTE,
            _ => false,
        }
    }

    /// Check if this is a no-station address
    pub fn is_no_station(&self) -> bool {
        self.logical_id == reserved::NO_STATION && self.physical_id == reserved::NO_STATION
    }
}

impl fmt::Display for HdlcAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ld_length = self.byte_length.div_ceil(2) * 2;
        let ph_length = (self.byte_length / 2) * 2;

        write!(f, "{:0width$X}", self.logical_id, width = ld_length)?;
        if ph_length > 0 {
            write!(f, "-{:0width$X}", self.physical_id, width = ph_length)?;
        }
        Ok(())
    }
}

/// HDLC address pair (source and destination)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HdlcAddressPair {
    source: HdlcAddress,
    destination: HdlcAddress,
}

impl HdlcAddressPair {
    pub fn new(source: HdlcAddress, destination: HdlcAddress) -> Self {
        Self { source, destination }
    }

    pub fn source(&self) -> HdlcAddress {
        self.source
    }

    pub fn destination(&self) -> HdlcAddress {
        self.destination
    }

    /// Same pair seen from the other end.
    pub fn reversed(&self) -> Self {
        Self::new(self.destination, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_address() {
        let addr = HdlcAddress::new(0x10).unwrap();
        assert_eq!(addr.encode(), vec![0x21]);
        assert!(HdlcAddress::new(0x80).is_err());
    }

    #[test]
    fn test_server_address_lengths() {
        let one = HdlcAddress::new_with_physical(1, 0).unwrap();
        assert_eq!(one.encode(), vec![0x03]);

        let two = HdlcAddress::new_with_physical(1, 0x11).unwrap();
        assert_eq!(two.encode(), vec![0x02, 0x23]);

        let four = HdlcAddress::new_with_physical(1, 0x3FF).unwrap();
        assert_eq!(four.byte_length(), 4);
        assert_eq!(four.encode(), vec![0x00, 0x02, 0x0E, 0xFF]);
        assert_eq!(HdlcAddress::decode(&four.encode()).unwrap(), four);
    }

    #[test]
    fn test_read_from_frame_bytes() {
        let (addr, len) = HdlcAddress::read_from(&[0x02, 0x23, 0x21, 0x93]).unwrap();
        assert_eq!(len, 2);
        assert_eq!(addr.logical_id(), 1);
        assert_eq!(addr.physical_id(), 0x11);
        assert_eq!(addr.to_string(), "01-11");

        assert!(HdlcAddress::read_from(&[0x02, 0x04, 0x06]).is_err());
        assert!(HdlcAddress::read_from(&[0x02, 0x04, 0x07]).is_err());
    }

    #[test]
    fn test_hdlc_address_pair() {
        let src = HdlcAddress::new(0x10).unwrap();
        let dst = HdlcAddress::new(0x01).unwrap();
        let pair = HdlcAddressPair::new(src, dst);
        assert_eq!(pair.reversed().source(), dst);
        assert_eq!(pair.reversed().destination(), src);
    }
}
