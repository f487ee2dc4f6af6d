use crate::error::{DlmsError, DlmsResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// "A-B:C.D.E*F", with "A-B:" and "*F" optional
static EXTENDED_FORMAT: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(?:(\d{1,3})-(\d{1,3}):)?(\d{1,3})\.(\d{1,3})\.(\d{1,3})(?:\*(\d{1,3}))?$").ok()
});

/// OBIS (Object Identification System) code identifying a COSEM object instance
///
/// Used as the 6-byte instance id of logical-name references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObisCode {
    bytes: [u8; 6],
}

impl ObisCode {
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        Self {
            bytes: [a, b, c, d, e, f],
        }
    }

    /// Build from the 6-byte instance id of a descriptor.
    pub fn from_slice(bytes: &[u8]) -> DlmsResult<Self> {
        let bytes: [u8; 6] = bytes.try_into().map_err(|_| {
            DlmsError::InvalidData(format!("OBIS code must be 6 bytes, got {}", bytes.len()))
        })?;
        Ok(Self { bytes })
    }

    /// Parse an OBIS code from string format
    ///
    /// Supports "1.1.1.8.0.255" and the reduced "1-0:1.8.0*255" notation;
    /// omitted groups default to A=0, B=0 and F=255.
    pub fn from_string(s: &str) -> DlmsResult<Self> {
        Self::parse_dot_format(s)
            .or_else(|_| Self::parse_extended_format(s))
            .map_err(|_| DlmsError::InvalidData(format!("Invalid OBIS code format: {}", s)))
    }

    fn parse_dot_format(s: &str) -> DlmsResult<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 6 {
            return Err(DlmsError::InvalidData("Expected 6 dot-separated values".to_string()));
        }
        let mut bytes = [0u8; 6];
        for (slot, part) in bytes.iter_mut().zip(parts) {
            *slot = parse_group(part)?;
        }
        Ok(Self { bytes })
    }

    fn parse_extended_format(s: &str) -> DlmsResult<Self> {
        let caps = EXTENDED_FORMAT
            .as_ref()
            .and_then(|pattern| pattern.captures(s))
            .ok_or_else(|| DlmsError::InvalidData(format!("Not an OBIS code: {}", s)))?;
        let group = |index: usize, default: u8| -> DlmsResult<u8> {
            caps.get(index).map_or(Ok(default), |m| parse_group(m.as_str()))
        };
        Ok(Self::new(
            group(1, 0)?,
            group(2, 0)?,
            group(3, 0)?,
            group(4, 0)?,
            group(5, 0)?,
            group(6, 255)?,
        ))
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.bytes
    }

    pub fn to_bytes(&self) -> [u8; 6] {
        self.bytes
    }
}

fn parse_group(part: &str) -> DlmsResult<u8> {
    part.parse::<u8>()
        .map_err(|_| DlmsError::InvalidData(format!("Invalid byte value: {}", part)))
}

impl fmt::Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.bytes;
        write!(f, "{}.{}.{}.{}.{}.{}", a, b, c, d, e, g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obis_code_from_dot_string() {
        let code = ObisCode::from_string("1.1.1.8.0.255").unwrap();
        assert_eq!(code, ObisCode::new(1, 1, 1, 8, 0, 255));
    }

    #[test]
    fn test_obis_code_from_extended_string() {
        let code = ObisCode::from_string("1-0:1.8.0*101").unwrap();
        assert_eq!(code, ObisCode::new(1, 0, 1, 8, 0, 101));
        let truncated = ObisCode::from_string("0.40").unwrap_err();
        assert!(matches!(truncated, DlmsError::InvalidData(_)));
        assert_eq!(
            ObisCode::from_string("1-0:99.1.0").unwrap(),
            ObisCode::new(1, 0, 99, 1, 0, 255)
        );
        assert!(ObisCode::from_string("1-0:300.1.0").is_err());
    }

    #[test]
    fn test_obis_code_display() {
        let code = ObisCode::new(0, 0, 40, 0, 0, 255);
        assert_eq!(code.to_string(), "0.0.40.0.0.255");
        assert_eq!(ObisCode::from_slice(code.as_bytes()).unwrap(), code);
        assert!(ObisCode::from_slice(&[1, 2, 3]).is_err());
    }
}
