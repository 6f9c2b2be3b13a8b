//! Decoding context
//!
//! [`Decoder`] owns everything that outlives a single segment: the
//! configuration, the port registry, the Router session table and the
//! counters. Callers feed it reassembled TCP segments one frame at a time.

use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::time::Instant;

use bytes::Bytes;
use tracing::{instrument, trace};

use crate::diag;
use crate::findings::{DiagnosticKind, FrameId, Findings, Layer};
use crate::metrics::{Metrics, MetricsSnapshot, PayloadKind};
use crate::ni::{self, Framing, Keepalive, Payload, PortRegistry, Protocol};
use crate::router::{self, ConnectionKey, RoutedPayload, RouterMessage, SessionState, SessionTable, Tracked};
use crate::scope::Scope;

/// Decoder configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Ask for more bytes when a PDU is incomplete. When unset, short PDUs
    /// are decoded as far as they go.
    pub desegment: bool,
    /// Ports carrying SAP Router traffic.
    pub router_ports: RangeInclusive<u16>,
    /// Ports carrying Diag traffic.
    pub diag_ports: RangeInclusive<u16>,
    /// Ports carrying NI traffic with no further decoder.
    pub ni_ports: Vec<u16>,
    /// Maximum nesting of payloads inside payloads.
    pub max_depth: usize,
    /// Recognize protocols by content before falling back to ports.
    pub heuristics: bool,
    /// Maximum number of Router sessions kept at once.
    pub max_sessions: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            desegment: true,
            router_ports: 3298..=3299,
            diag_ports: 3200..=3297,
            ni_ports: vec![3200, 40000],
            max_depth: 8,
            heuristics: true,
            max_sessions: 65_536,
        }
    }
}

/// Identity of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameInfo {
    /// Capture frame id
    pub id: FrameId,
    /// Sender
    pub src: SocketAddr,
    /// Receiver
    pub dst: SocketAddr,
}

impl FrameInfo {
    /// Describe frame `id` sent from `src` to `dst`.
    #[must_use]
    pub const fn new(id: u64, src: SocketAddr, dst: SocketAddr) -> Self {
        Self {
            id: FrameId(id),
            src,
            dst,
        }
    }
}

/// One decoded NI PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DecodedPdu {
    /// Offset of the length prefix in the segment
    pub offset: usize,
    /// Length announced by the prefix
    pub declared_len: u32,
    /// Set when the payload is shorter than announced
    pub truncated: bool,
    /// Decoded payload
    pub payload: Payload,
}

/// Everything decoded from one segment.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    /// Decoded PDUs in wire order
    pub pdus: Vec<DecodedPdu>,
    /// Bytes still missing for the last PDU, when reassembly is on
    pub need_more: Option<usize>,
    /// Bytes of the segment covered by `pdus`
    pub consumed: usize,
    /// Diagnostics and credentials raised while decoding
    pub findings: Findings,
}

impl FrameReport {
    /// Returns `true` if the whole segment was decoded.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.need_more.is_none()
    }

    /// Decoded payloads in wire order.
    pub fn payloads(&self) -> impl Iterator<Item = &Payload> {
        self.pdus.iter().map(|pdu| &pdu.payload)
    }
}

/// Stateful decoder for the NI protocol family.
#[derive(Debug)]
pub struct Decoder {
    config: DecoderConfig,
    registry: PortRegistry,
    sessions: SessionTable,
    metrics: Metrics,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl Decoder {
    /// Create a decoder.
    #[must_use]
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            registry: PortRegistry::from_config(&config),
            sessions: SessionTable::new(config.max_sessions),
            metrics: Metrics::default(),
            config,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Port registry used for dispatch.
    #[must_use]
    pub const fn registry(&self) -> &PortRegistry {
        &self.registry
    }

    /// Register an extra port.
    pub fn register_port(&mut self, port: u16, protocol: Protocol) {
        self.registry.register(port, protocol);
    }

    /// Snapshot of the decode counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Router session of the connection between `a` and `b`.
    #[must_use]
    pub fn session(&self, a: SocketAddr, b: SocketAddr) -> Option<&SessionState> {
        self.sessions.get(&ConnectionKey::new(a, b))
    }

    /// Number of live Router sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Forget the connection between `a` and `b`. Returns `true` if it had a session.
    pub fn close_connection(&mut self, a: SocketAddr, b: SocketAddr) -> bool {
        self.sessions.remove(&ConnectionKey::new(a, b)).is_some()
    }

    /// Decode the NI PDUs of one reassembled segment.
    ///
    /// Decoding the same frame again yields the same result and leaves the
    /// session state untouched.
    #[instrument(
        level = "debug",
        skip(self, frame, segment),
        fields(frame = %frame.id, src = %frame.src, dst = %frame.dst, len = segment.len())
    )]
    pub fn decode_segment(&mut self, frame: &FrameInfo, segment: Bytes) -> FrameReport {
        let started = Instant::now();
        let Self {
            config,
            registry,
            sessions,
            metrics,
        } = self;
        let key = ConnectionKey::new(frame.src, frame.dst);
        let mut report = FrameReport::default();
        let mut offset = 0;

        while offset < segment.len() {
            let pdu = match ni::next_pdu(&segment, offset) {
                Framing::Pdu(pdu) => pdu,
                Framing::NeedMoreBytes(missing) if config.desegment => {
                    trace!(offset, missing, "pdu incomplete");
                    metrics.record_need_more();
                    report.need_more = Some(missing);
                    break;
                }
                Framing::NeedMoreBytes(_) => {
                    if let Some(pdu) = ni::next_pdu_truncated(&segment, offset) {
                        report.findings.push(
                            DiagnosticKind::LengthMismatch,
                            Layer::Ni,
                            offset,
                            format!(
                                "length prefix {} but only {} bytes available",
                                pdu.declared_len,
                                pdu.payload.len()
                            ),
                        );
                        pdu
                    } else {
                        report.findings.push(
                            DiagnosticKind::InsufficientData,
                            Layer::Ni,
                            offset,
                            format!("{} trailing bytes, too short for a length prefix", segment.len() - offset),
                        );
                        offset = segment.len();
                        break;
                    }
                }
            };
            offset = pdu.end();

            let mut scope = Scope::new(frame.id, &mut report.findings, config.max_depth);
            let payload = dispatch(config, registry, sessions, frame, key, pdu.payload, pdu.offset, &mut scope);
            trace!(offset = pdu.offset, len = pdu.declared_len, "pdu decoded");

            metrics.record_pdu(payload_kind(&payload));
            metrics.record_items(item_count(&payload));
            report.pdus.push(DecodedPdu {
                offset: pdu.offset,
                declared_len: pdu.declared_len,
                truncated: pdu.truncated,
                payload,
            });
        }

        report.consumed = offset;
        metrics.record_segment(&report.findings, started.elapsed());
        report
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch(
    config: &DecoderConfig,
    registry: &PortRegistry,
    sessions: &mut SessionTable,
    frame: &FrameInfo,
    key: ConnectionKey,
    payload: Bytes,
    pdu_offset: usize,
    scope: &mut Scope,
) -> Payload {
    if let Some(keepalive) = ni::keepalive(&payload) {
        if keepalive == Keepalive::Pong {
            if let Some(session) = sessions.get_mut(&key) {
                if router::accept_route(session, pdu_offset, scope) {
                    return Payload::Router(RouterMessage::RouteAccepted);
                }
            }
        }
        return Payload::Keepalive(keepalive);
    }

    match registry.classify(&payload, frame.src.port(), frame.dst.port(), config.heuristics) {
        Some(Protocol::Router) => {
            let session = sessions.get_or_create(key);
            decode_router(config, registry, session, payload, pdu_offset, scope)
        }
        Some(Protocol::Diag) => Payload::Diag(diag::decode_message(payload, scope)),
        Some(Protocol::Ni) | None => Payload::Opaque(payload),
    }
}

fn decode_router(
    config: &DecoderConfig,
    registry: &PortRegistry,
    session: &mut SessionState,
    payload: Bytes,
    pdu_offset: usize,
    scope: &mut Scope,
) -> Payload {
    match router::track(session, payload.clone(), pdu_offset, scope) {
        Ok(Tracked::Done(message)) => Payload::Router(message),
        Ok(Tracked::Forward {
            destination,
            snc,
            payload: inner,
            raw,
        }) => {
            let inner = inner.map(|bytes| Box::new(decode_routed(config, registry, bytes, destination, scope)));
            Payload::Router(RouterMessage::Routed(RoutedPayload {
                destination,
                snc,
                inner,
                raw,
            }))
        }
        Err(err) => {
            scope.findings().push_error(Layer::Router, 0, &err);
            Payload::Opaque(payload)
        }
    }
}

fn decode_routed(
    config: &DecoderConfig,
    registry: &PortRegistry,
    payload: Bytes,
    destination: Option<u16>,
    scope: &mut Scope,
) -> Payload {
    let mut nested = match scope.descend() {
        Ok(nested) => nested,
        Err(err) => {
            scope.findings().push_error(Layer::Router, 0, &err);
            return Payload::Opaque(payload);
        }
    };
    if let Some(keepalive) = ni::keepalive(&payload) {
        return Payload::Keepalive(keepalive);
    }

    let sniffed = if config.heuristics { ni::sniff(&payload) } else { None };
    match sniffed.or_else(|| destination.and_then(|port| registry.lookup(port))) {
        Some(Protocol::Diag) => Payload::Diag(diag::decode_message(payload, &mut nested)),
        // The next router on the route keeps its own state; a chained
        // message is decoded without touching this connection's session.
        Some(Protocol::Router) => {
            let mut chained = SessionState::new();
            decode_router(config, registry, &mut chained, payload, 0, &mut nested)
        }
        Some(Protocol::Ni) | None => Payload::Opaque(payload),
    }
}

fn payload_kind(payload: &Payload) -> PayloadKind {
    match payload {
        Payload::Keepalive(_) => PayloadKind::Keepalive,
        Payload::Router(_) => PayloadKind::Router,
        Payload::Diag(_) => PayloadKind::Diag,
        Payload::Opaque(_) => PayloadKind::Opaque,
    }
}

fn item_count(payload: &Payload) -> usize {
    match payload {
        Payload::Diag(message) => message.items().len(),
        Payload::Router(RouterMessage::Routed(RoutedPayload {
            inner: Some(inner), ..
        })) => item_count(inner),
        _ => 0,
    }
}
