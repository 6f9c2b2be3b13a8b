//! NI framing layer
//!
//! Every NI PDU is a 4-byte big-endian length followed by that many payload
//! bytes. The framer never consumes input: it reports where the next PDU
//! lies, or how many more bytes are needed before one is complete.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use tracing::trace;

use crate::decoder::DecoderConfig;
use crate::diag::{self, DiagMessage};
use crate::router::{self, RouterMessage};

/// Keepalive request payload.
pub const NI_PING: &[u8; 8] = b"NI_PING\0";

/// Keepalive reply payload. Also accepts a pending route on Router connections.
pub const NI_PONG: &[u8; 8] = b"NI_PONG\0";

/// Size of the length prefix.
pub const NI_PREFIX_LEN: usize = 4;

/// One NI PDU located in a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    /// Offset of the length prefix in the buffer
    pub offset: usize,
    /// Length announced by the prefix
    pub declared_len: u32,
    /// Payload bytes
    pub payload: Bytes,
    /// Set when fewer than `declared_len` bytes were available
    pub truncated: bool,
}

impl Pdu {
    /// Offset just past this PDU.
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + NI_PREFIX_LEN + self.payload.len()
    }
}

/// Outcome of looking for the next PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framing {
    /// A complete PDU
    Pdu(Pdu),
    /// The PDU is incomplete; this many more bytes are needed
    NeedMoreBytes(usize),
}

/// Locate the PDU starting at `offset`.
#[must_use]
pub fn next_pdu(buf: &Bytes, offset: usize) -> Framing {
    let available = buf.len().saturating_sub(offset);
    let Some(declared_len) = read_prefix(buf, offset) else {
        return Framing::NeedMoreBytes(NI_PREFIX_LEN - available);
    };
    let needed = NI_PREFIX_LEN + declared_len as usize;
    if available < needed {
        return Framing::NeedMoreBytes(needed - available);
    }
    let start = offset + NI_PREFIX_LEN;
    Framing::Pdu(Pdu {
        offset,
        declared_len,
        payload: buf.slice(start..start + declared_len as usize),
        truncated: false,
    })
}

/// Locate the PDU starting at `offset`, accepting a short payload.
///
/// Used when the caller cannot supply more bytes. Returns `None` only when
/// not even the length prefix is present.
#[must_use]
pub fn next_pdu_truncated(buf: &Bytes, offset: usize) -> Option<Pdu> {
    let declared_len = read_prefix(buf, offset)?;
    let start = offset + NI_PREFIX_LEN;
    let end = start.saturating_add(declared_len as usize).min(buf.len());
    Some(Pdu {
        offset,
        declared_len,
        payload: buf.slice(start..end),
        truncated: end - start < declared_len as usize,
    })
}

fn read_prefix(buf: &[u8], offset: usize) -> Option<u32> {
    let prefix: [u8; NI_PREFIX_LEN] = buf.get(offset..offset.checked_add(NI_PREFIX_LEN)?)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix))
}

/// Iterate the PDUs of a buffer.
///
/// Yields every complete PDU, then at most one [`Framing::NeedMoreBytes`]
/// for an incomplete tail.
#[must_use]
pub fn split_pdus(buf: &Bytes) -> SplitPdus<'_> {
    SplitPdus {
        buf,
        offset: 0,
        done: false,
    }
}

/// Iterator returned by [`split_pdus`].
#[derive(Debug)]
pub struct SplitPdus<'a> {
    buf: &'a Bytes,
    offset: usize,
    done: bool,
}

impl SplitPdus<'_> {
    /// Bytes consumed by the complete PDUs yielded so far.
    #[must_use]
    pub const fn consumed(&self) -> usize {
        self.offset
    }
}

impl Iterator for SplitPdus<'_> {
    type Item = Framing;

    fn next(&mut self) -> Option<Framing> {
        if self.done || self.offset >= self.buf.len() {
            return None;
        }
        let framing = next_pdu(self.buf, self.offset);
        match &framing {
            Framing::Pdu(pdu) => self.offset = pdu.end(),
            Framing::NeedMoreBytes(_) => self.done = true,
        }
        Some(framing)
    }
}

/// Build a length-prefixed PDU around `payload`.
#[must_use]
pub fn encode_pdu(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(NI_PREFIX_LEN + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// NI keepalive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Keepalive {
    /// `NI_PING`
    Ping,
    /// `NI_PONG`
    Pong,
}

impl fmt::Display for Keepalive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => write!(f, "NI_PING"),
            Self::Pong => write!(f, "NI_PONG"),
        }
    }
}

/// Recognize a keepalive payload.
#[must_use]
pub fn keepalive(payload: &[u8]) -> Option<Keepalive> {
    if payload == NI_PING {
        Some(Keepalive::Ping)
    } else if payload == NI_PONG {
        Some(Keepalive::Pong)
    } else {
        None
    }
}

/// Decoded NI payload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Payload {
    /// Keepalive
    Keepalive(Keepalive),
    /// Router message
    Router(RouterMessage),
    /// Diag message
    Diag(DiagMessage),
    /// Payload with no decoder
    Opaque(Bytes),
}

/// Protocols carried over NI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Protocol {
    /// SAP Router
    Router,
    /// Diag
    Diag,
    /// Plain NI with no payload decoder
    Ni,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Router => write!(f, "router"),
            Self::Diag => write!(f, "diag"),
            Self::Ni => write!(f, "ni"),
        }
    }
}

/// Recognize a protocol from payload content alone.
#[must_use]
pub fn sniff(payload: &[u8]) -> Option<Protocol> {
    if router::looks_like_router(payload) {
        Some(Protocol::Router)
    } else if diag::looks_like_diag(payload) {
        Some(Protocol::Diag)
    } else {
        None
    }
}

/// Port to protocol table.
#[derive(Debug, Clone, Default)]
pub struct PortRegistry {
    ports: HashMap<u16, Protocol>,
}

impl PortRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry for a configuration.
    ///
    /// Generic NI ports are registered first, so the Diag and Router ranges
    /// win where they overlap.
    #[must_use]
    pub fn from_config(config: &DecoderConfig) -> Self {
        let mut registry = Self::new();
        for &port in &config.ni_ports {
            registry.register(port, Protocol::Ni);
        }
        for port in config.diag_ports.clone() {
            registry.register(port, Protocol::Diag);
        }
        for port in config.router_ports.clone() {
            registry.register(port, Protocol::Router);
        }
        registry
    }

    /// Register `port`, replacing any previous entry.
    pub fn register(&mut self, port: u16, protocol: Protocol) {
        self.ports.insert(port, protocol);
    }

    /// Protocol registered for `port`.
    #[must_use]
    pub fn lookup(&self, port: u16) -> Option<Protocol> {
        self.ports.get(&port).copied()
    }

    /// Pick the protocol of a payload exchanged between two ports.
    ///
    /// Content checks run first when `heuristics` is set, since distinct
    /// protocols share port ranges. The lower port is looked up before the
    /// higher one.
    #[must_use]
    pub fn classify(&self, payload: &[u8], src_port: u16, dst_port: u16, heuristics: bool) -> Option<Protocol> {
        if heuristics {
            if let Some(protocol) = sniff(payload) {
                return Some(protocol);
            }
        }
        let protocol = self
            .lookup(src_port.min(dst_port))
            .or_else(|| self.lookup(src_port.max(dst_port)));
        trace!(src_port, dst_port, ?protocol, "port lookup");
        protocol
    }
}
