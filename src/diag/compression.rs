//! Compression sub-header
//!
//! Compressed Diag bodies start with an 8-byte header. Only the header is
//! decoded; the compressed bytes are surfaced as-is.

use std::fmt;

use crate::error::Result;
use crate::reader::Reader;

/// Size of the compression sub-header.
pub const COMPRESSION_HEADER_LEN: usize = 8;

/// Magic bytes expected after the algorithm byte.
pub const COMPRESSION_MAGIC: [u8; 2] = [0x1f, 0x9d];

/// Compression algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum Algorithm {
    /// LZC
    Lzc = 0x10,
    /// LZH
    Lzh = 0x12,
}

impl Algorithm {
    /// Convert from byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x10 => Some(Self::Lzc),
            0x12 => Some(Self::Lzh),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lzc => write!(f, "LZC"),
            Self::Lzh => write!(f, "LZH"),
        }
    }
}

/// Decoded compression sub-header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CompressionHeader {
    /// Uncompressed length (little-endian on the wire)
    pub uncompressed_len: u32,
    /// Raw algorithm byte
    pub algorithm: u8,
    /// Magic bytes
    pub magic: [u8; 2],
    /// Algorithm-specific byte
    pub special: u8,
}

impl CompressionHeader {
    /// Decode from the reader.
    pub fn decode(reader: &mut Reader) -> Result<Self> {
        Ok(Self {
            uncompressed_len: reader.read_u32_le("compression.uncompressed_len")?,
            algorithm: reader.read_u8("compression.algorithm")?,
            magic: reader.read_fixed::<2>("compression.magic")?,
            special: reader.read_u8("compression.special")?,
        })
    }

    /// Typed algorithm, if known.
    #[must_use]
    pub const fn kind(&self) -> Option<Algorithm> {
        Algorithm::from_u8(self.algorithm)
    }

    /// Whether the magic bytes match.
    #[must_use]
    pub fn has_valid_magic(&self) -> bool {
        self.magic == COMPRESSION_MAGIC
    }

    /// Whether this header has a known algorithm and the expected magic.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.kind().is_some() && self.has_valid_magic()
    }

    /// Encode to wire bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; COMPRESSION_HEADER_LEN] {
        let len = self.uncompressed_len.to_le_bytes();
        [
            len[0],
            len[1],
            len[2],
            len[3],
            self.algorithm,
            self.magic[0],
            self.magic[1],
            self.special,
        ]
    }
}

/// Returns `true` if `buf` starts with a valid compression sub-header.
#[must_use]
pub fn looks_compressed(buf: &[u8]) -> bool {
    buf.len() >= COMPRESSION_HEADER_LEN
        && Algorithm::from_u8(buf[4]).is_some()
        && buf[5..7] == COMPRESSION_MAGIC
}
