//! Native model envelope.
//!
//! Every booster model stream is a 32-byte header followed by the booster's
//! raw payload. The header records which booster variant wrote the payload,
//! so a loader can pick the right constructor and a booster can refuse a
//! payload written by another variant.
//!
//! # Format Structure
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    Header (32 bytes)                        │
//! ├────────────────────────────────────────────────────────────┤
//! │                    Payload (payload_size bytes)             │
//! └────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::io::{self, Read, Write};

use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Magic bytes identifying a boostcore model stream.
pub const MAGIC: &[u8; 4] = b"BSTC";

/// Current format version (major).
pub const CURRENT_VERSION_MAJOR: u8 = 1;

/// Current format version (minor).
pub const CURRENT_VERSION_MINOR: u8 = 0;

/// Size of the format header in bytes.
pub const HEADER_SIZE: usize = 32;

// ============================================================================
// Booster Kind
// ============================================================================

/// Booster variant identifier stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum BoosterKind {
    /// Regression tree booster (`gbtree`).
    Tree = 0,
    /// Linear booster (`gblinear`).
    Linear = 1,
}

impl BoosterKind {
    /// Convert from u8, returning None for unknown values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Tree),
            1 => Some(Self::Linear),
            _ => None,
        }
    }

    /// Parse a booster name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "gbtree" => Some(Self::Tree),
            "gblinear" => Some(Self::Linear),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Tree => "gbtree",
            Self::Linear => "gblinear",
        }
    }
}

impl fmt::Display for BoosterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Format Header
// ============================================================================

/// 32-byte header for the native envelope.
///
/// # Layout
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     Magic ("BSTC")
/// 4       1     Version major
/// 5       1     Version minor
/// 6       1     Booster kind
/// 7       5     Reserved
/// 12      4     Payload size (bytes)
/// 16      4     CRC32 checksum of payload
/// 20      4     Number of features
/// 24      8     Reserved
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub kind: BoosterKind,
    pub payload_size: u32,
    pub checksum: u32,
    pub num_feature: u32,
}

impl FormatHeader {
    /// Create a new header with current version.
    pub fn new(kind: BoosterKind, num_feature: u32) -> Self {
        Self {
            version_major: CURRENT_VERSION_MAJOR,
            version_minor: CURRENT_VERSION_MINOR,
            kind,
            payload_size: 0,
            checksum: 0,
            num_feature,
        }
    }

    /// Serialize header to 32 bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = self.version_major;
        buf[5] = self.version_minor;
        buf[6] = self.kind as u8;
        buf[12..16].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[16..20].copy_from_slice(&self.checksum.to_le_bytes());
        buf[20..24].copy_from_slice(&self.num_feature.to_le_bytes());
        buf
    }

    /// Parse header from 32 bytes.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self, DeserializeError> {
        if &buf[0..4] != MAGIC {
            return Err(DeserializeError::NotAModel);
        }

        let version_major = buf[4];
        let version_minor = buf[5];
        if version_major > CURRENT_VERSION_MAJOR {
            return Err(DeserializeError::UnsupportedVersion {
                major: version_major,
                minor: version_minor,
            });
        }

        let kind = BoosterKind::from_u8(buf[6]).ok_or(DeserializeError::UnknownKind(buf[6]))?;
        let word = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

        Ok(Self {
            version_major,
            version_minor,
            kind,
            payload_size: word(12),
            checksum: word(16),
            num_feature: word(20),
        })
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during serialization.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Payload does not fit the 32-bit size field.
    #[error("payload of {0} bytes exceeds the envelope limit")]
    PayloadTooLarge(usize),
}

/// Errors that can occur during deserialization.
#[derive(Debug, Error)]
pub enum DeserializeError {
    /// Stream is not a boostcore model (wrong magic).
    #[error("not a boostcore model stream")]
    NotAModel,

    /// Model requires a newer format version.
    #[error("model requires format {major}.{minor} or later")]
    UnsupportedVersion { major: u8, minor: u8 },

    /// Payload checksum doesn't match.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Stream ended before the named section was complete.
    #[error("stream truncated while reading {section}")]
    Truncated { section: &'static str },

    /// Data was read completely but is inconsistent.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// Header names a booster kind this build does not know.
    #[error("unknown booster kind {0}")]
    UnknownKind(u8),

    /// Payload kind mismatch (e.g., expected gbtree but got gblinear).
    #[error("booster kind mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: BoosterKind,
        actual: BoosterKind,
    },

    /// I/O error during reading.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DeserializeError {
    /// Map a failed `read_exact` into `Truncated` or `Io`.
    pub(crate) fn from_read(err: io::Error, section: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated { section }
        } else {
            Self::Io(err)
        }
    }
}

// ============================================================================
// CRC32 Helper
// ============================================================================

/// Compute CRC32 checksum of data.
pub fn compute_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

// ============================================================================
// Native Codec
// ============================================================================

/// Reads and writes the envelope around a raw payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCodec;

impl NativeCodec {
    pub fn new() -> Self {
        Self
    }

    /// Write header and payload, filling in size and checksum.
    pub fn write_to<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        header: &mut FormatHeader,
        payload: &[u8],
    ) -> Result<(), SerializeError> {
        header.payload_size = u32::try_from(payload.len())
            .map_err(|_| SerializeError::PayloadTooLarge(payload.len()))?;
        header.checksum = compute_checksum(payload);

        writer.write_all(&header.to_bytes())?;
        writer.write_all(payload)?;
        Ok(())
    }

    /// Read only the header.
    pub fn read_header<R: Read + ?Sized>(
        &self,
        reader: &mut R,
    ) -> Result<FormatHeader, DeserializeError> {
        let mut header_buf = [0u8; HEADER_SIZE];
        reader
            .read_exact(&mut header_buf)
            .map_err(|e| DeserializeError::from_read(e, "envelope header"))?;
        FormatHeader::from_bytes(&header_buf)
    }

    /// Read the payload described by `header` and verify its checksum.
    pub fn read_payload<R: Read + ?Sized>(
        &self,
        reader: &mut R,
        header: &FormatHeader,
    ) -> Result<Vec<u8>, DeserializeError> {
        let mut payload = Vec::new();
        Read::take(&mut *reader, u64::from(header.payload_size)).read_to_end(&mut payload)?;
        if payload.len() != header.payload_size as usize {
            return Err(DeserializeError::Truncated {
                section: "envelope payload",
            });
        }

        let actual = compute_checksum(&payload);
        if actual != header.checksum {
            return Err(DeserializeError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }
        Ok(payload)
    }

    /// Read header and payload from a reader.
    pub fn read_from<R: Read + ?Sized>(
        &self,
        reader: &mut R,
    ) -> Result<(FormatHeader, Vec<u8>), DeserializeError> {
        let header = self.read_header(reader)?;
        let payload = self.read_payload(reader, &header)?;
        Ok((header, payload))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = FormatHeader {
            version_major: 1,
            version_minor: 2,
            kind: BoosterKind::Linear,
            payload_size: 12345,
            checksum: 0xDEADBEEF,
            num_feature: 100,
        };

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(FormatHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn header_wrong_magic() {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(b"XXXX");
        let result = FormatHeader::from_bytes(&buf);
        assert!(matches!(result, Err(DeserializeError::NotAModel)));
    }

    #[test]
    fn header_unsupported_version() {
        let mut header = FormatHeader::new(BoosterKind::Tree, 10);
        header.version_major = 99;
        let result = FormatHeader::from_bytes(&header.to_bytes());
        assert!(matches!(
            result,
            Err(DeserializeError::UnsupportedVersion { major: 99, .. })
        ));
    }

    #[test]
    fn header_unknown_kind() {
        let mut bytes = FormatHeader::new(BoosterKind::Tree, 1).to_bytes();
        bytes[6] = 42;
        let result = FormatHeader::from_bytes(&bytes);
        assert!(matches!(result, Err(DeserializeError::UnknownKind(42))));
    }

    #[test]
    fn codec_write_read_roundtrip() {
        let codec = NativeCodec::new();
        let mut header = FormatHeader::new(BoosterKind::Tree, 10);
        let payload = b"test payload data";

        let mut buffer = Vec::new();
        codec.write_to(&mut buffer, &mut header, payload).unwrap();
        assert_eq!(buffer.len(), HEADER_SIZE + payload.len());

        let (read_header, read_payload) = codec.read_from(&mut buffer.as_slice()).unwrap();
        assert_eq!(read_header.kind, BoosterKind::Tree);
        assert_eq!(read_header.num_feature, 10);
        assert_eq!(read_payload, payload);
    }

    #[test]
    fn codec_detects_corruption() {
        let codec = NativeCodec::new();
        let mut header = FormatHeader::new(BoosterKind::Linear, 5);
        let mut buffer = Vec::new();
        codec
            .write_to(&mut buffer, &mut header, b"some model data")
            .unwrap();

        buffer[HEADER_SIZE + 5] ^= 0xFF;
        let result = codec.read_from(&mut buffer.as_slice());
        assert!(matches!(result, Err(DeserializeError::ChecksumMismatch { .. })));
    }

    #[test]
    fn codec_detects_truncation() {
        let codec = NativeCodec::new();
        let mut header = FormatHeader::new(BoosterKind::Tree, 1);
        let mut buffer = Vec::new();
        codec.write_to(&mut buffer, &mut header, &[7u8; 64]).unwrap();

        buffer.truncate(HEADER_SIZE + 10);
        let err = codec.read_from(&mut buffer.as_slice()).unwrap_err();
        assert!(
            matches!(err, DeserializeError::Truncated { section: "envelope payload" }),
            "got: {err:?}"
        );

        buffer.truncate(8);
        let err = codec.read_from(&mut buffer.as_slice()).unwrap_err();
        assert!(matches!(err, DeserializeError::Truncated { section: "envelope header" }));
    }

    #[test]
    fn kind_names() {
        assert_eq!(BoosterKind::from_u8(0), Some(BoosterKind::Tree));
        assert_eq!(BoosterKind::from_u8(1), Some(BoosterKind::Linear));
        assert_eq!(BoosterKind::from_u8(255), None);
        assert_eq!(BoosterKind::from_name("gblinear"), Some(BoosterKind::Linear));
        assert_eq!(BoosterKind::Tree.to_string(), "gbtree");
    }
}
