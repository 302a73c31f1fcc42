//! Unit binary header
//!
//! Every materialized unit starts with a fixed header:
//! - magic (4 bytes, `RAYA`)
//! - version (u32, little-endian)
//! - flags (u32, little-endian)
//!
//! The payload that follows is opaque to the loader. Patches rewrite it
//! freely, so no payload checksum is stored in the header; the host
//! records a SHA-256 digest of the bytes it actually materialized.

use thiserror::Error;

/// Magic number for Raya units: "RAYA"
pub const MAGIC: [u8; 4] = *b"RAYA";

/// Current unit format version
pub const VERSION: u32 = 1;

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 12;

/// Header flags
pub mod flags {
    /// Unit carries reflection metadata
    pub const HAS_REFLECTION: u32 = 1 << 0;
    /// Unit carries debug information
    pub const HAS_DEBUG_INFO: u32 = 1 << 1;
}

/// Header decoding errors
#[derive(Debug, Error)]
pub enum FormatError {
    /// Input shorter than the header
    #[error("Unit is truncated: {0} bytes, header needs {size}", size = HEADER_SIZE)]
    Truncated(usize),

    /// Invalid magic number
    #[error("Invalid magic number: expected RAYA, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {current})", current = VERSION)]
    UnsupportedVersion(u32),
}

/// Decoded unit header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitHeader {
    /// Format version
    pub version: u32,
    /// Header flags
    pub flags: u32,
}

impl UnitHeader {
    /// Parse and validate the header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::Truncated(bytes.len()));
        }

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != MAGIC {
            return Err(FormatError::InvalidMagic(magic));
        }

        let version = read_u32(bytes, 4);
        if version != VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }

        Ok(Self {
            version,
            flags: read_u32(bytes, 8),
        })
    }

    /// Check if the unit carries reflection metadata
    pub fn has_reflection(&self) -> bool {
        (self.flags & flags::HAS_REFLECTION) != 0
    }

    /// Check if the unit carries debug information
    pub fn has_debug_info(&self) -> bool {
        (self.flags & flags::HAS_DEBUG_INFO) != 0
    }
}

/// Encode a unit: header followed by `payload`.
pub fn encode_unit(flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(HEADER_SIZE + payload.len());
    buffer.extend_from_slice(&MAGIC);
    buffer.extend_from_slice(&VERSION.to_le_bytes());
    buffer.extend_from_slice(&flags.to_le_bytes());
    buffer.extend_from_slice(payload);
    buffer
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_encoded_header() {
        let bytes = encode_unit(flags::HAS_REFLECTION, b"payload");
        let header = UnitHeader::parse(&bytes).unwrap();
        assert_eq!(header.version, VERSION);
        assert!(header.has_reflection());
        assert!(!header.has_debug_info());
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(
            UnitHeader::parse(b"RAYA"),
            Err(FormatError::Truncated(4))
        ));
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = encode_unit(0, &[]);
        bytes[0] = b'X';
        assert!(matches!(
            UnitHeader::parse(&bytes),
            Err(FormatError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = encode_unit(0, &[]);
        bytes[4..8].copy_from_slice(&7u32.to_le_bytes());
        assert!(matches!(
            UnitHeader::parse(&bytes),
            Err(FormatError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn test_trailing_bytes_are_payload() {
        let mut bytes = encode_unit(0, b"body");
        bytes.push(0x01);
        assert!(UnitHeader::parse(&bytes).is_ok());
    }
}
