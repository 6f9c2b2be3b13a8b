//! SNC (Secure Network Communication) frame unwrapping.
//!
//! SNC wraps arbitrary payloads (Router traffic, Diag messages) in a generic
//! frame. Only the frame structure is decoded; protected data is surfaced as
//! an inner payload when the frame type carries application data.

use std::fmt;

use bytes::Bytes;
use tracing::trace;

use crate::error::{Error, Result};
use crate::findings::{DiagnosticKind, Findings, Layer};
use crate::reader::Reader;

/// SNC frame eyecatcher.
pub const SNC_EYECATCHER: &[u8; 8] = b"SNCFRAME";

/// Bytes in front of the header-length field (eyecatcher, type, version).
pub const SNC_PREFIX_LEN: usize = 10;

/// Smallest valid remaining header length.
///
/// Covers header length, token length, data length, mechanism id and QoP.
pub const SNC_MIN_REMAINING_HEADER: usize = 14;

/// Size of the optional extension block prefix.
pub const SNC_EXT_PREFIX_LEN: usize = 6;

/// SNC frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum SncFrameType {
    /// Context initiation token
    Init = 0x01,
    /// Context accepted
    Accept = 0x02,
    /// Context rejected
    Reject = 0x03,
    /// Acceptor failed
    AcceptFailed = 0x04,
    /// Error token
    Error = 0x05,
    /// Context shutdown
    Shutdown = 0x06,
    /// Integrity-only data
    DataOpen = 0x07,
    /// Wrapped (sealed) data
    DataWrap = 0x08,
}

impl SncFrameType {
    /// Convert from byte
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Init),
            0x02 => Some(Self::Accept),
            0x03 => Some(Self::Reject),
            0x04 => Some(Self::AcceptFailed),
            0x05 => Some(Self::Error),
            0x06 => Some(Self::Shutdown),
            0x07 => Some(Self::DataOpen),
            0x08 => Some(Self::DataWrap),
            _ => None,
        }
    }

    /// Whether frames of this type carry an application payload.
    #[must_use]
    pub const fn carries_data(self) -> bool {
        matches!(self, Self::DataOpen | Self::DataWrap)
    }
}

impl fmt::Display for SncFrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::Accept => "ACCEPT",
            Self::Reject => "REJECT",
            Self::AcceptFailed => "ACCEPT_FAILED",
            Self::Error => "ERROR",
            Self::Shutdown => "SHUTDOWN",
            Self::DataOpen => "DATA_OPEN",
            Self::DataWrap => "DATA_WRAP",
        };
        write!(f, "{name}")
    }
}

/// Name of a security mechanism id, if known.
#[must_use]
pub fn mechanism_name(mech_id: u16) -> Option<&'static str> {
    match mech_id {
        0x00 => Some("NONE"),
        0x01 => Some("KERBEROS_V5"),
        0x02 => Some("SECUDE_5"),
        0x03 => Some("SAP_NTLM"),
        0x04 => Some("SPNEGO"),
        0x05 => Some("SAP_CRYPTOLIB"),
        0x06 => Some("GSSAPI_X509"),
        0x07 => Some("SAP_NTLMSSP"),
        _ => None,
    }
}

/// Decoded SNC frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SncFrame {
    /// Raw frame type byte
    pub frame_type: u8,
    /// Protocol version
    pub version: u8,
    /// Declared header length (includes the 10 prefix bytes)
    pub header_length: u16,
    /// Declared token length
    pub token_length: u32,
    /// Declared data length
    pub data_length: u32,
    /// Security mechanism id
    pub mech_id: u16,
    /// Minimum quality of protection
    pub qop_min: u8,
    /// Maximum quality of protection
    pub qop_max: u8,
    /// Quality of protection in use
    pub qop_use: u8,
    /// Extension flags, when the header carries an extension block
    pub ext_flags: Option<u32>,
    /// Extension field, when present
    pub ext_field: Option<Bytes>,
    /// Security token
    pub token: Bytes,
    /// Protected data
    pub data: Bytes,
}

impl SncFrame {
    /// Typed frame kind, if known.
    #[must_use]
    pub fn kind(&self) -> Option<SncFrameType> {
        SncFrameType::from_u8(self.frame_type)
    }

    /// Inner payload for data-carrying frames.
    #[must_use]
    pub fn payload(&self) -> Option<&Bytes> {
        match self.kind() {
            Some(kind) if kind.carries_data() => Some(&self.data),
            _ => None,
        }
    }
}

/// Returns `true` if `buf` starts with the SNC eyecatcher.
#[must_use]
pub fn is_snc_frame(buf: &[u8]) -> bool {
    buf.starts_with(SNC_EYECATCHER)
}

/// Decode an SNC frame from `buf`.
///
/// Header length problems are clamped and reported through `findings`; a
/// missing eyecatcher or a header too short to read is fatal.
pub fn unwrap_frame(buf: Bytes, findings: &mut Findings) -> Result<SncFrame> {
    let total = buf.len();
    let mut reader = Reader::new(buf);

    let eyecatcher = reader.read_fixed::<8>("snc.eyecatcher")?;
    if &eyecatcher != SNC_EYECATCHER {
        return Err(Error::malformed("snc frame", "missing SNCFRAME eyecatcher"));
    }
    let frame_type = reader.read_u8("snc.frame_type")?;
    let version = reader.read_u8("snc.version")?;

    let header_start = reader.position();
    let header_length = reader.read_u16("snc.header_length")?;

    let declared_remaining = usize::from(header_length).saturating_sub(SNC_PREFIX_LEN);
    let mut remaining = declared_remaining;
    if remaining < SNC_MIN_REMAINING_HEADER {
        findings.push(
            DiagnosticKind::LengthMismatch,
            Layer::Snc,
            header_start,
            format!(
                "invalid header length {header_length}, clamped to {SNC_MIN_REMAINING_HEADER} remaining bytes"
            ),
        );
        remaining = SNC_MIN_REMAINING_HEADER;
    }
    let available = total - header_start;
    if remaining > available {
        findings.push(
            DiagnosticKind::LengthMismatch,
            Layer::Snc,
            header_start,
            format!("header length {remaining} exceeds available {available} bytes"),
        );
        remaining = available;
    }
    let header_end = header_start + remaining;

    let token_length = reader.read_u32("snc.token_length")?;
    let data_length = reader.read_u32("snc.data_length")?;
    let mech_id = reader.read_u16("snc.mech_id")?;
    let qop = reader.read_u8("snc.qop")?;
    let qop_use = reader.read_u8("snc.qop_use")? & 0x0f;
    let (qop_min, qop_max) = (qop & 0x0f, qop >> 4);

    let mut ext_flags = None;
    let mut ext_field = None;
    if header_end.saturating_sub(reader.position()) >= SNC_EXT_PREFIX_LEN {
        ext_flags = Some(reader.read_u32("snc.ext_flags")?);
        let ext_len = usize::from(reader.read_u16("snc.ext_field_length")?);
        let room = header_end.saturating_sub(reader.position());
        if ext_len > room {
            findings.push(
                DiagnosticKind::LengthMismatch,
                Layer::Snc,
                reader.position(),
                format!("extension field length {ext_len} exceeds header room {room}"),
            );
        }
        ext_field = Some(reader.read_bytes("snc.ext_field", ext_len.min(room))?);
    }
    let padding = header_end.saturating_sub(reader.position());
    reader.skip("snc.header_padding", padding)?;

    let token = read_section(&mut reader, token_length, "token", findings);
    let data = read_section(&mut reader, data_length, "data", findings);

    trace!(frame_type, mech_id, token = token.len(), data = data.len(), "snc frame");

    Ok(SncFrame {
        frame_type,
        version,
        header_length,
        token_length,
        data_length,
        mech_id,
        qop_min,
        qop_max,
        qop_use,
        ext_flags,
        ext_field,
        token,
        data,
    })
}

fn read_section(
    reader: &mut Reader,
    declared: u32,
    name: &'static str,
    findings: &mut Findings,
) -> Bytes {
    let offset = reader.position();
    let declared = usize::try_from(declared).unwrap_or(usize::MAX);
    let (section, clamped) = reader.read_clamped(declared);
    if clamped {
        findings.push(
            DiagnosticKind::LengthMismatch,
            Layer::Snc,
            offset,
            format!("{name} length {declared} exceeds available {} bytes", section.len()),
        );
    }
    section
}

/// Build an SNC frame with a minimal header. Used by tests and benches.
#[must_use]
pub fn encode_frame(frame_type: SncFrameType, mech_id: u16, token: &[u8], data: &[u8]) -> Vec<u8> {
    let header_length = (SNC_PREFIX_LEN + SNC_MIN_REMAINING_HEADER) as u16;
    let mut out = Vec::with_capacity(usize::from(header_length) + token.len() + data.len());
    out.extend_from_slice(SNC_EYECATCHER);
    out.push(frame_type as u8);
    out.push(1);
    out.extend_from_slice(&header_length.to_be_bytes());
    out.extend_from_slice(&(token.len() as u32).to_be_bytes());
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&mech_id.to_be_bytes());
    out.push(0x31);
    out.push(0x03);
    out.extend_from_slice(token);
    out.extend_from_slice(data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(frame_type: u8, header_length: u16, token: u32, data: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(SNC_EYECATCHER);
        out.push(frame_type);
        out.push(1);
        out.extend_from_slice(&header_length.to_be_bytes());
        out.extend_from_slice(&token.to_be_bytes());
        out.extend_from_slice(&data.to_be_bytes());
        out.extend_from_slice(&4u16.to_be_bytes());
        out.extend_from_slice(&[0x21, 0x02]);
        out
    }

    #[test]
    fn test_data_frame_yields_payload() {
        let bytes = encode_frame(SncFrameType::DataOpen, 1, b"tok", b"inner");
        let mut findings = Findings::new();
        let frame = unwrap_frame(Bytes::from(bytes), &mut findings).unwrap();

        assert!(findings.is_empty());
        assert_eq!(frame.kind(), Some(SncFrameType::DataOpen));
        assert_eq!(frame.token.as_ref(), b"tok");
        assert_eq!(frame.payload().unwrap().as_ref(), b"inner");
        assert_eq!((frame.qop_min, frame.qop_max, frame.qop_use), (1, 3, 3));
    }

    #[test]
    fn test_handshake_frame_has_no_payload() {
        let bytes = encode_frame(SncFrameType::Init, 1, b"token", b"");
        let frame = unwrap_frame(Bytes::from(bytes), &mut Findings::new()).unwrap();
        assert!(frame.payload().is_none());
    }

    #[test]
    fn test_short_header_length_clamped_to_minimum() {
        let mut bytes = header(0x07, 9, 0, 2);
        bytes.extend_from_slice(b"ok");
        let mut findings = Findings::new();
        let frame = unwrap_frame(Bytes::from(bytes), &mut findings).unwrap();

        assert_eq!(findings.count(DiagnosticKind::LengthMismatch), 1);
        assert!(findings.diagnostics()[0].message.contains("invalid header length 9"));
        assert_eq!(frame.header_length, 9);
        assert_eq!(frame.data.as_ref(), b"ok");
        assert_eq!((frame.qop_min, frame.qop_max, frame.qop_use), (1, 2, 2));
    }

    #[test]
    fn test_extension_block_parsed() {
        let mut bytes = header(0x08, 32, 0, 1);
        bytes.extend_from_slice(&0x0000_0001u32.to_be_bytes());
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        bytes.push(0x55);
        let mut findings = Findings::new();
        let frame = unwrap_frame(Bytes::from(bytes), &mut findings).unwrap();

        assert!(findings.is_empty());
        assert_eq!(frame.ext_flags, Some(1));
        assert_eq!(frame.ext_field.as_deref(), Some(&[0xAA, 0xBB][..]));
        assert_eq!(frame.payload().unwrap().as_ref(), &[0x55]);
    }

    #[test]
    fn test_header_length_clamped_to_available() {
        let bytes = header(0x07, 400, 0, 0);
        let mut findings = Findings::new();
        let frame = unwrap_frame(Bytes::from(bytes), &mut findings).unwrap();
        assert_eq!(findings.count(DiagnosticKind::LengthMismatch), 1);
        assert!(frame.data.is_empty());
    }

    #[test]
    fn test_truncated_data_clamped() {
        let mut bytes = header(0x07, 24, 0, 10);
        bytes.extend_from_slice(b"abc");
        let mut findings = Findings::new();
        let frame = unwrap_frame(Bytes::from(bytes), &mut findings).unwrap();
        assert_eq!(frame.data.as_ref(), b"abc");
        assert_eq!(findings.count(DiagnosticKind::LengthMismatch), 1);
    }

    #[test]
    fn test_missing_eyecatcher_is_fatal() {
        let result = unwrap_frame(Bytes::from_static(b"NOTSNC__\x07\x01"), &mut Findings::new());
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }
}
