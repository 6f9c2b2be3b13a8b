//! Diag application protocol
//!
//! A Diag message is an optional 200-byte dispatcher envelope, an 8-byte
//! header and a body. The header's compression indicator decides how the
//! body is read: a plain item stream, a compressed block, or an SNC frame
//! whose payload is decoded again.

pub mod atom;
pub mod compression;
pub mod dp;
pub mod event;
pub mod header;
pub mod item;
pub mod menu;
pub mod records;
pub mod support;

use bytes::Bytes;
use tracing::{debug, trace};

pub use compression::{Algorithm, COMPRESSION_HEADER_LEN, CompressionHeader, looks_compressed};
pub use dp::{DP_HEADER_LEN, DpHeader, ReqInfo};
pub use header::{CommFlags, Compress, DIAG_HEADER_LEN, DiagHeader};
pub use item::{DiagItem, ItemTag, ItemValue, parse_items};
pub use support::{SUPPORT_BIT_COUNT, SUPPORT_BIT_NAMES, SupportBits};

use crate::findings::{DiagnosticKind, Layer};
use crate::reader::{Reader, utf16le_text};
use crate::scope::Scope;
use crate::snc::{self, SncFrame};

/// First byte of a message carrying a DP envelope.
pub const DP_MARKER: u8 = 0xff;

/// Prefix of a DP trace message.
pub const DPTM_MSG_PREFIX: &[u8; 12] = b"**DPTMMSG**\0";

/// Prefix of a DP trace opcode message.
pub const DPTM_OPC_PREFIX: &[u8; 12] = b"**DPTMOPC**\0";

/// Kind of DP trace message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DptmKind {
    /// `**DPTMMSG**`
    Message,
    /// `**DPTMOPC**`
    Opcode,
}

/// Body of a Diag message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DiagBody {
    /// Nothing after the header
    Empty,
    /// Bytes that could not be interpreted
    Opaque(Bytes),
    /// DP trace message
    Dptm {
        /// Trace message kind
        kind: DptmKind,
        /// Bytes after the prefix
        payload: Bytes,
    },
    /// Error text sent in place of the item stream
    Error(String),
    /// Item stream
    Items(Vec<DiagItem>),
    /// Compressed block
    Compressed {
        /// Compression sub-header
        header: CompressionHeader,
        /// Compressed bytes
        data: Bytes,
    },
    /// SNC-protected body
    Snc {
        /// SNC frame
        frame: SncFrame,
        /// Decoded payload of data-carrying frames
        inner: Option<Box<DiagBody>>,
    },
}

impl DiagBody {
    /// Items of this body, looking through SNC protection.
    #[must_use]
    pub fn items(&self) -> &[DiagItem] {
        match self {
            Self::Items(items) => items,
            Self::Snc {
                inner: Some(inner), ..
            } => inner.items(),
            _ => &[],
        }
    }
}

/// Decoded Diag message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DiagMessage {
    /// Dispatcher envelope, when present
    pub dp: Option<DpHeader>,
    /// Diag header; absent for DP trace messages and truncated messages
    pub header: Option<DiagHeader>,
    /// Body
    pub body: DiagBody,
    /// Set on the initialization message of a connection
    pub init: bool,
}

impl DiagMessage {
    /// Items of this message.
    #[must_use]
    pub fn items(&self) -> &[DiagItem] {
        self.body.items()
    }
}

/// Returns `true` if `buf` carries a DP envelope.
#[must_use]
pub fn has_dp_header(buf: &[u8]) -> bool {
    buf.first() == Some(&DP_MARKER) && buf.len() >= DP_HEADER_LEN + DIAG_HEADER_LEN
}

/// Content check used to recognize Diag traffic on unregistered ports.
#[must_use]
pub fn looks_like_diag(buf: &[u8]) -> bool {
    has_dp_header(buf) || dptm_kind(buf).is_some()
}

fn dptm_kind(buf: &[u8]) -> Option<DptmKind> {
    if buf.starts_with(DPTM_MSG_PREFIX) {
        Some(DptmKind::Message)
    } else if buf.starts_with(DPTM_OPC_PREFIX) {
        Some(DptmKind::Opcode)
    } else {
        None
    }
}

/// Decode one Diag message.
///
/// Never fails: every problem becomes a diagnostic in the scope's findings
/// and the undecodable part is surfaced as [`DiagBody::Opaque`].
pub fn decode_message(buf: Bytes, scope: &mut Scope) -> DiagMessage {
    let mut reader = Reader::new(buf);

    let dp = has_dp_header(reader.peek_rest()).then(|| {
        let dp = DpHeader::decode(&mut reader);
        if dp.truncated {
            scope.findings().push(
                DiagnosticKind::InsufficientData,
                Layer::Dp,
                0,
                "dp envelope truncated",
            );
        }
        dp
    });

    if let Some(kind) = dptm_kind(reader.peek_rest()) {
        let offset = reader.position();
        let body = match reader.read_fixed::<12>("diag.dptm") {
            Ok(_) => DiagBody::Dptm {
                kind,
                payload: reader.read_rest(),
            },
            Err(err) => {
                scope.findings().push_error(Layer::Diag, offset, &err);
                DiagBody::Opaque(reader.read_rest())
            }
        };
        return DiagMessage {
            init: dp.is_some(),
            dp,
            header: None,
            body,
        };
    }

    let offset = reader.position();
    let header = match DiagHeader::decode(&mut reader) {
        Ok(header) => header,
        Err(err) => {
            scope.findings().push_error(Layer::Diag, offset, &err);
            return DiagMessage {
                init: dp.is_some(),
                dp,
                header: None,
                body: DiagBody::Opaque(reader.read_rest()),
            };
        }
    };

    let init = dp.is_some() || (header.mode == DP_MARKER && header.comm_flags.is_init());
    trace!(
        mode = header.mode,
        compress = header.compress,
        flags = %header.comm_flags,
        init,
        "diag header"
    );
    let body = decode_body(&header, reader.read_rest(), scope);

    DiagMessage {
        dp,
        header: Some(header),
        body,
        init,
    }
}

fn decode_body(header: &DiagHeader, body: Bytes, scope: &mut Scope) -> DiagBody {
    match header.compression() {
        Some(Compress::Off) if header.err_no != 0 => DiagBody::Error(utf16le_text(&body)),
        Some(Compress::Off) if body.is_empty() => DiagBody::Empty,
        Some(Compress::Off) => DiagBody::Items(parse_items(body, scope)),
        Some(Compress::On) => decode_compressed(body, scope),
        Some(Compress::Encrypted | Compress::EncryptedWrap) => decode_snc(body, scope),
        None => {
            scope.findings().push(
                DiagnosticKind::MalformedStructure,
                Layer::Diag,
                DIAG_HEADER_LEN - 1,
                format!("unknown compress value {}", header.compress),
            );
            DiagBody::Opaque(body)
        }
    }
}

fn decode_compressed(body: Bytes, scope: &mut Scope) -> DiagBody {
    let mut reader = Reader::new(body.clone());
    let header = match CompressionHeader::decode(&mut reader) {
        Ok(header) => header,
        Err(err) => {
            scope.findings().push_error(Layer::Diag, 0, &err);
            return DiagBody::Opaque(body);
        }
    };
    if header.kind().is_none() {
        scope.findings().push(
            DiagnosticKind::UnrecognizedTag,
            Layer::Diag,
            4,
            format!("unknown compression algorithm {:#04x}", header.algorithm),
        );
    }
    if !header.has_valid_magic() {
        scope.findings().push(
            DiagnosticKind::MalformedStructure,
            Layer::Diag,
            5,
            format!("bad compression magic {:02x}{:02x}", header.magic[0], header.magic[1]),
        );
    }
    DiagBody::Compressed {
        header,
        data: reader.read_rest(),
    }
}

fn decode_snc(body: Bytes, scope: &mut Scope) -> DiagBody {
    let mut inner_scope = match scope.descend() {
        Ok(inner) => inner,
        Err(err) => {
            scope.findings().push_error(Layer::Diag, 0, &err);
            return DiagBody::Opaque(body);
        }
    };
    let frame = match snc::unwrap_frame(body.clone(), inner_scope.findings()) {
        Ok(frame) => frame,
        Err(err) => {
            inner_scope.findings().push_error(Layer::Snc, 0, &err);
            return DiagBody::Opaque(body);
        }
    };
    debug!(frame_type = frame.frame_type, "diag body is snc protected");

    let inner = frame.payload().cloned().map(|payload| {
        let inner = if looks_compressed(&payload) {
            decode_compressed(payload, &mut inner_scope)
        } else if payload.is_empty() {
            DiagBody::Empty
        } else {
            DiagBody::Items(parse_items(payload, &mut inner_scope))
        };
        Box::new(inner)
    });
    DiagBody::Snc { frame, inner }
}

/// Build a Diag message from a header and body. Used by tests and benches.
#[must_use]
pub fn encode_message(header: &DiagHeader, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(DIAG_HEADER_LEN + body.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(body);
    out
}
