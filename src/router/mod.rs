//! SAP Router protocol
//!
//! Router messages are recognized by a leading eyecatcher. Route requests,
//! route accepts and SNC negotiation move the connection's
//! [`SessionState`] forward; everything else on an accepted route is a
//! routed payload for the final hop.

pub mod admin;
pub mod route;
pub mod session;

use bytes::Bytes;
use tracing::{debug, trace};

pub use admin::{
    AdminBody, AdminMessage, ControlMessage, ErrorField, ErrorInfo, NI_RTERR, ROUTER_ADM, RtErr,
    decode_admin, decode_rterr,
};
pub use route::{
    NI_ROUTE, RouteHop, RouteRequest, TalkMode, decode_route_request, encode_route_request,
    encode_route_string, parse_route_string, service_to_port,
};
pub use session::{ConnectionKey, RouteState, SessionState, SessionTable};

use crate::error::Result;
use crate::findings::{DiagnosticKind, Layer};
use crate::ni::Payload;
use crate::scope::Scope;
use crate::snc::{self, SncFrame};

/// Niping eyecatcher.
pub const NIPING_EYECATCHER: &[u8; 10] = b"EYECATCHER";

/// Decoded Router message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RouterMessage {
    /// Niping test traffic, kept opaque
    Niping(Bytes),
    /// Route request
    RouteRequest(RouteRequest),
    /// PONG accepting the pending route
    RouteAccepted,
    /// Admin command
    Admin(AdminMessage),
    /// Error information
    ErrorInfo(ErrorInfo),
    /// Control message
    Control(ControlMessage),
    /// Payload forwarded along the route
    Routed(RoutedPayload),
}

impl RouterMessage {
    /// Short name of the message kind.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Niping(_) => "niping",
            Self::RouteRequest(_) => "route request",
            Self::RouteAccepted => "route accepted",
            Self::Admin(_) => "admin",
            Self::ErrorInfo(_) => "error information",
            Self::Control(_) => "control",
            Self::Routed(_) => "routed payload",
        }
    }
}

/// Payload forwarded along an accepted route.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RoutedPayload {
    /// Port of the final hop, when the route is accepted and the service resolves
    pub destination: Option<u16>,
    /// SNC frame wrapping the payload on protected connections
    pub snc: Option<SncFrame>,
    /// Decoded inner payload
    pub inner: Option<Box<Payload>>,
    /// Payload bytes as seen on the wire
    pub raw: Bytes,
}

/// Result of feeding one NI payload to the session tracker.
#[derive(Debug)]
pub(crate) enum Tracked {
    /// Fully decoded router message
    Done(RouterMessage),
    /// Routed payload; the caller decodes `payload` for `destination`
    Forward {
        destination: Option<u16>,
        snc: Option<SncFrame>,
        payload: Option<Bytes>,
        raw: Bytes,
    },
}

/// Returns `true` if `buf` starts with a Router eyecatcher.
#[must_use]
pub fn looks_like_router(buf: &[u8]) -> bool {
    buf.starts_with(NIPING_EYECATCHER)
        || buf.starts_with(NI_ROUTE)
        || buf.starts_with(ROUTER_ADM)
        || buf.starts_with(NI_RTERR)
}

/// Handle a PONG on a Router connection.
///
/// Returns `true` if the PONG accepts the pending route, or is the frame
/// already recorded as the accept.
pub fn accept_route(session: &mut SessionState, pdu_offset: usize, scope: &Scope) -> bool {
    let frame = scope.frame();
    if !session.is_route_accept(frame) {
        return false;
    }
    if session.first_visit(frame, pdu_offset) {
        session.record_accept(frame);
    }
    true
}

/// Decode one NI payload of a Router connection and update its session.
pub(crate) fn track(
    session: &mut SessionState,
    payload: Bytes,
    pdu_offset: usize,
    scope: &mut Scope,
) -> Result<Tracked> {
    let frame = scope.frame();

    if payload.starts_with(NIPING_EYECATCHER) {
        return Ok(Tracked::Done(RouterMessage::Niping(payload)));
    }

    if payload.starts_with(NI_ROUTE) {
        let request = decode_route_request(payload.slice(NI_ROUTE.len()..), scope)?;
        let first = session.first_visit(frame, pdu_offset);
        if session.state() == RouteState::RouteAccepted
            && session.route_requested_frame() != Some(frame)
        {
            scope.findings().push(
                DiagnosticKind::MalformedStructure,
                Layer::Router,
                0,
                "route request on a connection whose route is already accepted",
            );
        } else if first {
            session.record_route(frame, request.hops.clone());
        }
        return Ok(Tracked::Done(RouterMessage::RouteRequest(request)));
    }

    if payload.starts_with(ROUTER_ADM) {
        let message = decode_admin(payload.slice(ROUTER_ADM.len()..), scope)?;
        return Ok(Tracked::Done(RouterMessage::Admin(message)));
    }

    if payload.starts_with(NI_RTERR) {
        return match decode_rterr(payload.slice(NI_RTERR.len()..), scope)? {
            RtErr::Error(info) => Ok(Tracked::Done(RouterMessage::ErrorInfo(info))),
            RtErr::Control(control) => {
                if admin::is_snc_opcode(control.opcode) && session.first_visit(frame, pdu_offset) {
                    session.mark_snc_protected();
                }
                Ok(Tracked::Done(RouterMessage::Control(control)))
            }
        };
    }

    let mut frame_out = None;
    let mut inner = Some(payload.clone());
    if session.snc_protected() && snc::is_snc_frame(&payload) {
        let mut nested = scope.descend()?;
        match snc::unwrap_frame(payload.clone(), nested.findings()) {
            Ok(snc_frame) => {
                inner = snc_frame.payload().cloned();
                frame_out = Some(snc_frame);
            }
            Err(err) => {
                nested.findings().push_error(Layer::Snc, 0, &err);
                inner = None;
            }
        }
    }

    let destination = if session.state() == RouteState::RouteAccepted {
        session.destination().map(RouteHop::port).filter(|&port| port != 0)
    } else {
        None
    };
    match destination {
        Some(port) => trace!(port, len = payload.len(), "routed payload"),
        None => debug!(state = %session.state(), "routed payload without known destination"),
    }

    Ok(Tracked::Forward {
        destination,
        snc: frame_out,
        payload: inner,
        raw: payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::{FrameId, Findings};
    use crate::snc::{SncFrameType, encode_frame};

    fn hop(host: &str, service: &str, password: &str) -> RouteHop {
        RouteHop {
            host: host.into(),
            service: service.into(),
            password: password.into(),
        }
    }

    fn track_in(
        session: &mut SessionState,
        frame: u64,
        payload: Vec<u8>,
    ) -> (Result<Tracked>, Findings) {
        let mut findings = Findings::new();
        let mut scope = Scope::new(FrameId(frame), &mut findings, 4);
        let out = track(session, Bytes::from(payload), 0, &mut scope);
        (out, findings)
    }

    fn pong(session: &mut SessionState, frame: u64) -> bool {
        let mut findings = Findings::new();
        let scope = Scope::new(FrameId(frame), &mut findings, 4);
        accept_route(session, 0, &scope)
    }

    #[test]
    fn test_route_lifecycle() {
        let mut session = SessionState::new();
        let hops = [hop("client", "0", ""), hop("sap01", "sapdp00", "pw")];
        let (out, findings) = track_in(&mut session, 1, encode_route_request(&hops, TalkMode::RoutIo));

        assert!(matches!(out, Ok(Tracked::Done(RouterMessage::RouteRequest(_)))));
        assert_eq!(findings.credentials().len(), 1);
        assert_eq!(session.state(), RouteState::RouteRequested);

        assert!(pong(&mut session, 2));
        assert_eq!(session.state(), RouteState::RouteAccepted);
        assert!(pong(&mut session, 2));
        assert!(!pong(&mut session, 3));

        let (out, _) = track_in(&mut session, 4, b"payload".to_vec());
        match out {
            Ok(Tracked::Forward { destination, payload, .. }) => {
                assert_eq!(destination, Some(3200));
                assert_eq!(payload.as_deref(), Some(&b"payload"[..]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_pong_without_route_is_keepalive() {
        let mut session = SessionState::new();
        assert!(!pong(&mut session, 1));
        assert_eq!(session.state(), RouteState::NoRoute);
    }

    #[test]
    fn test_second_route_after_accept() {
        let mut session = SessionState::new();
        track_in(&mut session, 1, encode_route_request(&[hop("a", "3299", "")], TalkMode::RoutIo)).0.unwrap();
        assert!(pong(&mut session, 2));

        let (out, findings) =
            track_in(&mut session, 3, encode_route_request(&[hop("b", "3201", "")], TalkMode::RoutIo));
        assert!(out.is_ok());
        assert_eq!(findings.count(DiagnosticKind::MalformedStructure), 1);
        assert_eq!(session.route_hops()[0].host, "a");
    }

    #[test]
    fn test_snc_control_protects_connection() {
        let mut session = SessionState::new();
        let token = encode_frame(SncFrameType::Init, 5, b"tok", b"");
        let (out, _) = track_in(&mut session, 1, admin::encode_rterr(70, 0, &token));
        assert!(matches!(out, Ok(Tracked::Done(RouterMessage::Control(_)))));
        assert!(session.snc_protected());

        let wrapped = encode_frame(SncFrameType::DataWrap, 5, b"", b"inner");
        let (out, _) = track_in(&mut session, 2, wrapped);
        match out {
            Ok(Tracked::Forward { snc, payload, destination, .. }) => {
                assert!(snc.is_some());
                assert_eq!(payload.as_deref(), Some(&b"inner"[..]));
                assert_eq!(destination, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_niping_and_eyecatchers() {
        assert!(looks_like_router(b"EYECATCHER\x00\x01"));
        assert!(looks_like_router(b"NI_RTERR\x00"));
        assert!(!looks_like_router(b"NI_PONG\x00"));

        let mut session = SessionState::new();
        let (out, _) = track_in(&mut session, 1, b"EYECATCHERdata".to_vec());
        assert!(matches!(out, Ok(Tracked::Done(RouterMessage::Niping(_)))));
    }
}
