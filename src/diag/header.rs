//! Diag message header
//!
//! Every Diag message starts with an 8-byte header (optionally preceded by
//! the 200-byte dispatcher envelope, see [`super::dp`]).

use std::fmt;

use crate::error::Result;
use crate::reader::Reader;

/// Size of the Diag header.
pub const DIAG_HEADER_LEN: usize = 8;

/// Diag header (8 bytes)
///
/// # Wire Format
///
/// ```text
/// +--------+--------+--------+--------+--------+--------+--------+--------+
/// |  mode  | comm   | mode   | err no | msg    | msg    | msg rc |compress|
/// |        | flags  | stat   |        | type   | info   |        |        |
/// +--------+--------+--------+--------+--------+--------+--------+--------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DiagHeader {
    /// Session mode number, 0xFF during initialization
    pub mode: u8,
    /// Communication flags
    pub comm_flags: CommFlags,
    /// Mode status
    pub mode_stat: u8,
    /// Error number, non-zero when the body is an error text
    pub err_no: u8,
    /// Message type
    pub msg_type: u8,
    /// Message info
    pub msg_info: u8,
    /// Message return code
    pub msg_rc: u8,
    /// Raw compression indicator
    pub compress: u8,
}

impl DiagHeader {
    /// Decode the header from the reader.
    pub fn decode(reader: &mut Reader) -> Result<Self> {
        let raw = reader.read_fixed::<DIAG_HEADER_LEN>("diag.header")?;
        Ok(Self::from_bytes(raw))
    }

    /// Build from raw header bytes.
    #[must_use]
    pub const fn from_bytes(raw: [u8; DIAG_HEADER_LEN]) -> Self {
        Self {
            mode: raw[0],
            comm_flags: CommFlags::from_u8(raw[1]),
            mode_stat: raw[2],
            err_no: raw[3],
            msg_type: raw[4],
            msg_info: raw[5],
            msg_rc: raw[6],
            compress: raw[7],
        }
    }

    /// Encode to wire bytes.
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; DIAG_HEADER_LEN] {
        [
            self.mode,
            self.comm_flags.as_u8(),
            self.mode_stat,
            self.err_no,
            self.msg_type,
            self.msg_info,
            self.msg_rc,
            self.compress,
        ]
    }

    /// Typed compression indicator.
    #[must_use]
    pub const fn compression(&self) -> Option<Compress> {
        Compress::from_u8(self.compress)
    }
}

/// Diag communication flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CommFlags(u8);

impl CommFlags {
    /// End of screen
    pub const TERM_EOS: u8 = 0x80;
    /// End of connection
    pub const TERM_EOC: u8 = 0x40;
    /// No operation
    pub const TERM_NOP: u8 = 0x20;
    /// End of page
    pub const TERM_EOP: u8 = 0x10;
    /// Initialization
    pub const TERM_INI: u8 = 0x08;
    /// Cascading
    pub const TERM_CAS: u8 = 0x04;
    /// New mode
    pub const TERM_NNM: u8 = 0x02;
    /// Graphics
    pub const TERM_GRA: u8 = 0x01;

    const NAMES: [(u8, &'static str); 8] = [
        (Self::TERM_EOS, "TERM_EOS"),
        (Self::TERM_EOC, "TERM_EOC"),
        (Self::TERM_NOP, "TERM_NOP"),
        (Self::TERM_EOP, "TERM_EOP"),
        (Self::TERM_INI, "TERM_INI"),
        (Self::TERM_CAS, "TERM_CAS"),
        (Self::TERM_NNM, "TERM_NNM"),
        (Self::TERM_GRA, "TERM_GRA"),
    ];

    /// Create from byte. Every bit is named, so any value is valid.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        Self(value)
    }

    /// Convert to byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Check whether a flag is set
    #[must_use]
    pub const fn has(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    /// Check if this is an initialization message
    #[must_use]
    pub const fn is_init(self) -> bool {
        self.has(Self::TERM_INI)
    }

    /// Check if the connection is ending
    #[must_use]
    pub const fn is_end_of_connection(self) -> bool {
        self.has(Self::TERM_EOC)
    }
}

impl fmt::Display for CommFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<_> = Self::NAMES
            .iter()
            .filter(|(bit, _)| self.has(*bit))
            .map(|(_, name)| *name)
            .collect();
        if parts.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", parts.join(" | "))
        }
    }
}

/// Diag compression indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum Compress {
    /// Plain item stream
    Off = 0,
    /// Compressed payload
    On = 1,
    /// SNC-protected payload
    Encrypted = 2,
    /// SNC-wrapped payload
    EncryptedWrap = 3,
}

impl Compress {
    /// Convert from byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Off),
            1 => Some(Self::On),
            2 => Some(Self::Encrypted),
            3 => Some(Self::EncryptedWrap),
            _ => None,
        }
    }

    /// Whether the body is SNC-protected.
    #[must_use]
    pub const fn is_encrypted(self) -> bool {
        matches!(self, Self::Encrypted | Self::EncryptedWrap)
    }
}

impl fmt::Display for Compress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "OFF",
            Self::On => "ON",
            Self::Encrypted => "ENCRYPTED",
            Self::EncryptedWrap => "ENCRYPTED_WRAP",
        };
        write!(f, "{name}")
    }
}
