use std::net::SocketAddr;

use bytes::Bytes;
use sapwire::diag::atom::{AtomAttr, encode_atom, etype};
use sapwire::diag::item::{appl_id, encode_appl, item_type};
use sapwire::diag::{CommFlags, DP_MARKER, DiagBody, DiagHeader, DiagMessage, DpHeader, SupportBits, encode_message};
use sapwire::ni::encode_pdu;
use sapwire::snc::{SncFrameType, encode_frame};
use sapwire::{
    CredentialKind, Decoder, DecoderConfig, DiagnosticKind, FrameId, FrameInfo, ItemValue, Payload,
};

fn gui() -> SocketAddr {
    "172.16.0.8:51515".parse().unwrap()
}

fn dispatcher() -> SocketAddr {
    "172.16.0.2:3200".parse().unwrap()
}

fn frame(id: u64) -> FrameInfo {
    FrameInfo::new(id, gui(), dispatcher())
}

fn header(mode: u8, flags: u8, compress: u8) -> DiagHeader {
    DiagHeader::from_bytes([mode, flags, 0, 0, 0, 0, 0, compress])
}

fn diag(payload: &Payload) -> &DiagMessage {
    match payload {
        Payload::Diag(message) => message,
        other => panic!("expected a diag message, got {other:?}"),
    }
}

fn login_screen() -> Vec<u8> {
    let mut atoms = encode_atom(etype::OFIELD_0, 4, 2, AtomAttr::PROTECTED, b"\x08Password");
    let mut field = vec![0x01, 0x08, 0x28];
    field.extend_from_slice(&40u16.to_be_bytes());
    field.extend_from_slice(b"hunter2");
    atoms.extend(encode_atom(etype::EFIELD_1, 4, 20, AtomAttr::INVISIBLE, &field));

    let support = SupportBits::with_bits(&[0, 2]);
    let mut items = encode_appl(item_type::APPL, appl_id::ST_USER, 0x0b, support.as_bytes());
    items.extend(encode_appl(item_type::APPL4, appl_id::DYNT, 0x02, &atoms));
    items.push(item_type::EOM);
    items
}

#[test]
fn test_initial_login_message() {
    let dp = DpHeader {
        terminal: "ws01".into(),
        ..DpHeader::default()
    };
    let mut raw = dp.to_bytes();
    raw[0] = DP_MARKER;
    raw.extend(encode_message(&header(0xff, CommFlags::TERM_INI, 0), &login_screen()));

    let mut decoder = Decoder::default();
    let report = decoder.decode_segment(&frame(10), Bytes::from(encode_pdu(&raw)));
    assert!(report.is_complete());
    assert!(report.findings.diagnostics().is_empty());

    let message = diag(&report.pdus[0].payload);
    assert!(message.init);
    assert_eq!(message.dp.as_ref().map(|dp| dp.terminal.as_str()), Some("ws01"));

    let names: Vec<_> = message.items().iter().map(|item| item.name).collect();
    assert_eq!(names, vec![Some("SUPPORTDATA"), Some("DYNT_ATOM"), Some("EOM")]);
    let ItemValue::SupportBits(bits) = &message.items()[0].value else {
        panic!("expected support bits");
    };
    assert!(bits.is_set_by_name("PROGRESS_INDICATOR"));
    assert!(bits.is_set_by_name("SAPGUI_DIAGVERSION"));
    assert!(!bits.is_set_by_name("SAPGUI_LABELS"));

    let ItemValue::Atoms(groups) = &message.items()[1].value else {
        panic!("expected atoms");
    };
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].head.body.text(), Some("Password"));

    let credentials = report.findings.credentials();
    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].kind, CredentialKind::PasswordField);
    assert_eq!(credentials[0].value, "hunter2");
    assert_eq!(credentials[0].frame, FrameId(10));

    let metrics = decoder.metrics();
    assert_eq!(metrics.diag_messages, 1);
    assert_eq!(metrics.diag_items, 3);
    assert_eq!(metrics.credentials, 1);
}

#[test]
fn test_malformed_atom_stays_local() {
    let mut items = encode_appl(
        item_type::APPL4,
        appl_id::DYNT,
        0x02,
        &encode_atom(etype::FNAME, 0, 0, 0, b"RSYST-BNAME"),
    );
    items.extend_from_slice(&[item_type::SBA, 0x05, 0x0a]);
    let raw = encode_message(&header(0, 0, 0), &items);

    let mut decoder = Decoder::default();
    let report = decoder.decode_segment(&frame(11), Bytes::from(encode_pdu(&raw)));
    let message = diag(&report.pdus[0].payload);

    assert_eq!(message.items().len(), 2);
    assert_eq!(message.items()[0].value, ItemValue::Opaque);
    assert!(matches!(&message.items()[1].value, ItemValue::Sba(sba) if sba.y == 5 && sba.x == 10));
    assert_eq!(report.findings.count(DiagnosticKind::MalformedStructure), 1);
}

#[test]
fn test_bad_pdu_does_not_desynchronize_the_next() {
    let mut segment = encode_pdu(&encode_message(&header(0, 0, 0), &[0x99, 1, 2, 3]));
    segment.extend(encode_pdu(&encode_message(&header(0, 0, 0), &[item_type::SBA, 1, 1])));

    let mut decoder = Decoder::default();
    let report = decoder.decode_segment(&frame(12), Bytes::from(segment));

    assert_eq!(report.pdus.len(), 2);
    assert_eq!(diag(&report.pdus[0].payload).items()[0].value, ItemValue::Opaque);
    assert!(matches!(diag(&report.pdus[1].payload).items()[0].value, ItemValue::Sba(_)));
    assert_eq!(report.findings.count(DiagnosticKind::UnrecognizedTag), 1);
    assert_eq!(decoder.metrics().unrecognized_items, 1);
}

#[test]
fn test_split_message_is_requested_then_decoded() {
    let raw = encode_pdu(&encode_message(&header(0, 0, 0), &login_screen()));
    let (head, _) = raw.split_at(30);

    let mut decoder = Decoder::default();
    let partial = decoder.decode_segment(&frame(13), Bytes::copy_from_slice(head));
    assert!(partial.pdus.is_empty());
    assert_eq!(partial.consumed, 0);
    assert_eq!(partial.need_more, Some(raw.len() - 30));
    assert!(partial.findings.is_empty());

    let full = decoder.decode_segment(&frame(14), Bytes::from(raw));
    assert!(full.is_complete());
    assert_eq!(diag(&full.pdus[0].payload).items().len(), 3);
}

#[test]
fn test_short_pdu_without_reassembly() {
    let raw = encode_pdu(&encode_message(&header(0, 0, 0), &[item_type::SBA, 1, 1, item_type::EOM]));
    let mut decoder = Decoder::new(DecoderConfig {
        desegment: false,
        ..DecoderConfig::default()
    });
    let report = decoder.decode_segment(&frame(15), Bytes::copy_from_slice(&raw[..raw.len() - 1]));

    assert!(report.is_complete());
    assert!(report.pdus[0].truncated);
    assert_eq!(report.consumed, raw.len() - 1);
    assert_eq!(report.findings.count(DiagnosticKind::LengthMismatch), 1);
    assert_eq!(diag(&report.pdus[0].payload).items().len(), 1);
}

#[test]
fn test_snc_protected_diag() {
    let inner = [item_type::SBA, 3, 4];
    let body = encode_frame(SncFrameType::DataWrap, 7, b"", &inner);
    let raw = encode_message(&header(0, 0, 3), &body);

    let mut decoder = Decoder::default();
    let report = decoder.decode_segment(&frame(16), Bytes::from(encode_pdu(&raw)));
    let message = diag(&report.pdus[0].payload);

    assert!(matches!(&message.body, DiagBody::Snc { frame, .. } if frame.mech_id == 7));
    assert!(matches!(&message.items()[0].value, ItemValue::Sba(sba) if sba.y == 3 && sba.x == 4));
}

#[test]
fn test_keepalive_between_messages() {
    let mut segment = encode_pdu(b"NI_PING\x00");
    segment.extend(encode_pdu(&encode_message(&header(0, 0, 0), &[item_type::EOM])));
    segment.extend(encode_pdu(b"NI_PONG\x00"));

    let mut decoder = Decoder::default();
    let report = decoder.decode_segment(&frame(17), Bytes::from(segment));
    assert_eq!(report.pdus.len(), 3);
    assert_eq!(report.pdus[0].payload, Payload::Keepalive(sapwire::Keepalive::Ping));
    assert_eq!(report.pdus[2].payload, Payload::Keepalive(sapwire::Keepalive::Pong));
    assert_eq!(decoder.metrics().keepalives, 2);
    assert_eq!(decoder.session_count(), 0);
}
