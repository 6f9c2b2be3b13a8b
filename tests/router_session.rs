use std::net::SocketAddr;

use bytes::Bytes;
use sapwire::diag::item::item_type;
use sapwire::diag::{DiagHeader, encode_message};
use sapwire::ni::encode_pdu;
use sapwire::router::admin::{AdminBody, ROUTER_ADM, encode_rterr};
use sapwire::router::{TalkMode, encode_route_request};
use sapwire::snc::{SncFrameType, encode_frame};
use sapwire::{
    CredentialKind, Decoder, DiagnosticKind, FrameId, FrameInfo, ItemValue, Keepalive, Payload,
    RouteHop, RouteState, RouterMessage,
};

fn client() -> SocketAddr {
    "10.1.1.20:52000".parse().unwrap()
}

fn saprouter() -> SocketAddr {
    "10.1.1.1:3299".parse().unwrap()
}

fn outbound(id: u64) -> FrameInfo {
    FrameInfo::new(id, client(), saprouter())
}

fn inbound(id: u64) -> FrameInfo {
    FrameInfo::new(id, saprouter(), client())
}

fn hop(host: &str, service: &str, password: &str) -> RouteHop {
    RouteHop {
        host: host.into(),
        service: service.into(),
        password: password.into(),
    }
}

fn route() -> Vec<RouteHop> {
    vec![
        hop("10.1.1.20", "0", ""),
        hop("saprouter", "3299", ""),
        hop("sapapp01", "sapdp00", "s3cret"),
    ]
}

fn pdu(payload: &[u8]) -> Bytes {
    Bytes::from(encode_pdu(payload))
}

fn diag_sba() -> Vec<u8> {
    encode_message(&DiagHeader::from_bytes([0; 8]), &[item_type::SBA, 7, 9])
}

fn router_message(payload: &Payload) -> &RouterMessage {
    match payload {
        Payload::Router(message) => message,
        other => panic!("expected a router message, got {other:?}"),
    }
}

/// Request the route and accept it.
fn establish(decoder: &mut Decoder) {
    decoder.decode_segment(&outbound(1), pdu(&encode_route_request(&route(), TalkMode::RoutIo)));
    decoder.decode_segment(&inbound(2), pdu(b"NI_PONG\x00"));
}

#[test]
fn test_route_request_accept_and_forward() {
    let mut decoder = Decoder::default();

    let report = decoder.decode_segment(&outbound(1), pdu(&encode_route_request(&route(), TalkMode::RoutIo)));
    let RouterMessage::RouteRequest(request) = router_message(&report.pdus[0].payload) else {
        panic!("expected a route request");
    };
    assert_eq!(request.hops, route());
    assert_eq!(request.talk_mode, TalkMode::RoutIo as u8);

    let credentials = report.findings.credentials();
    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].kind, CredentialKind::RoutePassword);
    assert_eq!(credentials[0].context, "sapapp01");
    assert_eq!(credentials[0].value, "s3cret");
    assert_eq!(credentials[0].frame, FrameId(1));

    let session = decoder.session(client(), saprouter()).unwrap();
    assert_eq!(session.state(), RouteState::RouteRequested);
    assert_eq!(session.route_requested_frame(), Some(FrameId(1)));

    let report = decoder.decode_segment(&inbound(2), pdu(b"NI_PONG\x00"));
    assert_eq!(report.pdus[0].payload, Payload::Router(RouterMessage::RouteAccepted));
    let session = decoder.session(saprouter(), client()).unwrap();
    assert_eq!(session.state(), RouteState::RouteAccepted);
    assert_eq!(session.route_accepted_frame(), Some(FrameId(2)));

    let report = decoder.decode_segment(&outbound(3), pdu(&diag_sba()));
    let RouterMessage::Routed(routed) = router_message(&report.pdus[0].payload) else {
        panic!("expected a routed payload");
    };
    assert_eq!(routed.destination, Some(3200));
    assert!(routed.snc.is_none());
    let Some(Payload::Diag(message)) = routed.inner.as_deref() else {
        panic!("expected diag inside the route, got {:?}", routed.inner);
    };
    assert!(matches!(message.items()[0].value, ItemValue::Sba(_)));
    assert_eq!(decoder.metrics().diag_items, 1);
}

#[test]
fn test_reanalysis_is_idempotent() {
    let mut decoder = Decoder::default();
    establish(&mut decoder);

    let again = decoder.decode_segment(&outbound(1), pdu(&encode_route_request(&route(), TalkMode::RoutIo)));
    assert!(again.findings.diagnostics().is_empty());
    assert_eq!(again.findings.credentials().len(), 1);
    assert_eq!(again.findings.credentials()[0].frame, FrameId(1));

    let again = decoder.decode_segment(&inbound(2), pdu(b"NI_PONG\x00"));
    assert_eq!(again.pdus[0].payload, Payload::Router(RouterMessage::RouteAccepted));

    let session = decoder.session(client(), saprouter()).unwrap();
    assert_eq!(session.route_hops().len(), 3);
    assert_eq!(session.route_requested_frame(), Some(FrameId(1)));
    assert_eq!(session.route_accepted_frame(), Some(FrameId(2)));

    let later = decoder.decode_segment(&inbound(7), pdu(b"NI_PONG\x00"));
    assert_eq!(later.pdus[0].payload, Payload::Keepalive(Keepalive::Pong));
}

#[test]
fn test_new_route_after_accept_is_reported() {
    let mut decoder = Decoder::default();
    establish(&mut decoder);

    let other = [hop("10.1.1.20", "0", ""), hop("sapapp02", "3201", "")];
    let report = decoder.decode_segment(&outbound(5), pdu(&encode_route_request(&other, TalkMode::RoutIo)));
    assert!(matches!(router_message(&report.pdus[0].payload), RouterMessage::RouteRequest(_)));
    assert_eq!(report.findings.count(DiagnosticKind::MalformedStructure), 1);

    let session = decoder.session(client(), saprouter()).unwrap();
    assert_eq!(session.state(), RouteState::RouteAccepted);
    assert_eq!(session.destination().map(RouteHop::port), Some(3200));
}

#[test]
fn test_snc_negotiation_unwraps_routed_traffic() {
    let mut decoder = Decoder::default();
    establish(&mut decoder);

    let token = encode_frame(SncFrameType::Init, 6, b"x509-token", b"");
    let report = decoder.decode_segment(&inbound(3), pdu(&encode_rterr(70, 0, &token)));
    let RouterMessage::Control(control) = router_message(&report.pdus[0].payload) else {
        panic!("expected a control message");
    };
    assert_eq!(control.opcode_name(), Some("SNC_REQUEST"));
    assert_eq!(control.snc.as_ref().map(|frame| frame.mech_id), Some(6));
    assert!(decoder.session(client(), saprouter()).unwrap().snc_protected());

    let wrapped = encode_frame(SncFrameType::DataWrap, 6, b"", &diag_sba());
    let report = decoder.decode_segment(&outbound(4), pdu(&wrapped));
    let RouterMessage::Routed(routed) = router_message(&report.pdus[0].payload) else {
        panic!("expected a routed payload");
    };
    assert_eq!(routed.snc.as_ref().and_then(|frame| frame.kind()), Some(SncFrameType::DataWrap));
    assert!(matches!(routed.inner.as_deref(), Some(Payload::Diag(message)) if message.items().len() == 1));
}

#[test]
fn test_admin_info_password() {
    let mut decoder = Decoder::default();
    let mut admin = ROUTER_ADM.to_vec();
    admin.extend_from_slice(&[0x28, 2, 0, 0]);
    admin.extend_from_slice(b"infopw\0");

    let report = decoder.decode_segment(&outbound(1), pdu(&admin));
    let RouterMessage::Admin(message) = router_message(&report.pdus[0].payload) else {
        panic!("expected an admin message");
    };
    assert_eq!(message.command_name(), Some("INFORMATION_REQUEST"));
    assert_eq!(
        message.body,
        AdminBody::InfoRequest {
            password: Some("infopw".into())
        }
    );
    assert_eq!(report.findings.credentials()[0].kind, CredentialKind::AdminPassword);
}

#[test]
fn test_error_information() {
    let mut decoder = Decoder::default();
    let text = sapwire::router::admin::encode_error_text(&["*ERR*", "1", "route permission denied", "-94"]);
    let report = decoder.decode_segment(&inbound(2), pdu(&encode_rterr(0, -94, &text)));

    let RouterMessage::ErrorInfo(info) = router_message(&report.pdus[0].payload) else {
        panic!("expected error information");
    };
    assert_eq!(info.return_code, -94);
    assert_eq!(info.field("error"), Some("route permission denied"));
    assert!(report.findings.diagnostics().is_empty());
}

#[test]
fn test_close_connection_forgets_route() {
    let mut decoder = Decoder::default();
    establish(&mut decoder);
    assert_eq!(decoder.session_count(), 1);

    assert!(decoder.close_connection(saprouter(), client()));
    assert!(!decoder.close_connection(saprouter(), client()));
    assert!(decoder.session(client(), saprouter()).is_none());

    let report = decoder.decode_segment(&outbound(9), pdu(&diag_sba()));
    let RouterMessage::Routed(routed) = router_message(&report.pdus[0].payload) else {
        panic!("expected a routed payload");
    };
    assert_eq!(routed.destination, None);
    assert!(matches!(routed.inner.as_deref(), Some(Payload::Opaque(_))));
    assert_eq!(
        decoder.session(client(), saprouter()).map(|session| session.state()),
        Some(RouteState::NoRoute)
    );
}
