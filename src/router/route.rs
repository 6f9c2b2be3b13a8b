//! Route requests and route strings.
//!
//! A route string is a list of hops, each made of three NUL-terminated
//! strings: host, service and password. The first hop is the client side,
//! the last hop is the final destination.

use std::fmt;

use bytes::Bytes;
use tracing::trace;

use crate::error::Result;
use crate::findings::{CredentialKind, DiagnosticKind, Layer};
use crate::reader::Reader;
use crate::scope::Scope;

/// Route request eyecatcher, terminator included.
pub const NI_ROUTE: &[u8; 9] = b"NI_ROUTE\0";

/// Size of the fixed route request header after the eyecatcher.
pub const ROUTE_HEADER_LEN: usize = 15;

/// Added to the wire route offset on decode, subtracted on encode.
pub const ROUTE_OFFSET_ADJUST: u32 = 4;

/// Route version written by [`encode_route_request`].
pub const ROUTE_VERSION: u8 = 2;

/// NI version written by [`encode_route_request`].
pub const NI_VERSION: u8 = 39;

/// One hop of a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RouteHop {
    /// Host name or address
    pub host: String,
    /// Service, numeric or symbolic
    pub service: String,
    /// Hop password, empty when unset
    pub password: String,
}

impl RouteHop {
    /// Numeric port for the service, 0 when it cannot be translated.
    #[must_use]
    pub fn port(&self) -> u16 {
        service_to_port(&self.service)
    }

    /// Whether the hop carries a password.
    #[must_use]
    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }
}

impl fmt::Display for RouteHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/H/{}/S/{}", self.host, self.service)?;
        if self.has_password() {
            write!(f, "/P/***")?;
        }
        Ok(())
    }
}

/// Translate a service string to a port number.
///
/// Digits parse as decimal. `sapdpNN`, `sapgwNN` and `sapmsNN` map to the
/// dispatcher, gateway and message server ports of instance `NN`. Anything
/// else maps to 0.
#[must_use]
pub fn service_to_port(service: &str) -> u16 {
    fn instance(rest: &str, base: u16) -> u16 {
        if rest.is_empty() || rest.len() > 2 || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return 0;
        }
        rest.parse::<u16>().map_or(0, |nn| base + nn)
    }

    if !service.is_empty() && service.bytes().all(|b| b.is_ascii_digit()) {
        return service.parse().unwrap_or(0);
    }
    if let Some(rest) = service.strip_prefix("sapdp") {
        instance(rest, 3200)
    } else if let Some(rest) = service.strip_prefix("sapgw") {
        instance(rest, 3300)
    } else if let Some(rest) = service.strip_prefix("sapms") {
        instance(rest, 3600)
    } else {
        0
    }
}

/// Talk mode requested for the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum TalkMode {
    /// NI message I/O
    MsgIo = 0,
    /// Raw I/O
    RawIo = 1,
    /// Routed I/O
    RoutIo = 2,
}

impl TalkMode {
    /// Convert from byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::MsgIo),
            1 => Some(Self::RawIo),
            2 => Some(Self::RoutIo),
            _ => None,
        }
    }
}

impl fmt::Display for TalkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MsgIo => "NI_MSG_IO",
            Self::RawIo => "NI_RAW_IO",
            Self::RoutIo => "NI_ROUT_IO",
        };
        write!(f, "{name}")
    }
}

/// Decoded route request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RouteRequest {
    /// Route version
    pub route_version: u8,
    /// NI version
    pub ni_version: u8,
    /// Declared number of hops
    pub entries: u8,
    /// Raw talk mode
    pub talk_mode: u8,
    /// Hops still to traverse
    pub rest_nodes: u8,
    /// Declared route string length
    pub route_length: u32,
    /// Offset of the current hop, wire value plus [`ROUTE_OFFSET_ADJUST`]
    pub route_offset: u32,
    /// Decoded hops
    pub hops: Vec<RouteHop>,
}

/// Decode a route request body (the bytes after [`NI_ROUTE`]).
///
/// Passwords are reported on the credential channel each time the request
/// is decoded.
pub fn decode_route_request(body: Bytes, scope: &mut Scope) -> Result<RouteRequest> {
    let mut reader = Reader::new(body);
    let route_version = reader.read_u8("route.version")?;
    let ni_version = reader.read_u8("route.ni_version")?;
    let entries = reader.read_u8("route.entries")?;
    let talk_mode = reader.read_u8("route.talk_mode")?;
    reader.skip("route.reserved", 2)?;
    let rest_nodes = reader.read_u8("route.rest_nodes")?;
    let route_length = reader.read_u32("route.length")?;
    let offset_pos = reader.position() + NI_ROUTE.len();
    let wire_offset = reader.read_u32("route.offset")?;
    let route_offset = wire_offset.checked_add(ROUTE_OFFSET_ADJUST).unwrap_or_else(|| {
        scope.findings().push(
            DiagnosticKind::LengthMismatch,
            Layer::Router,
            offset_pos,
            format!("route offset {wire_offset} overflows"),
        );
        u32::MAX
    });

    let start = reader.position() + NI_ROUTE.len();
    let declared = usize::try_from(route_length).unwrap_or(usize::MAX);
    let (route, clamped) = reader.read_clamped(declared);
    if clamped || !reader.is_empty() {
        scope.findings().push(
            DiagnosticKind::LengthMismatch,
            Layer::Router,
            start,
            format!(
                "route string length {route_length} but {} bytes follow the header",
                route.len() + reader.remaining()
            ),
        );
    }
    let hops = parse_route_string(route, scope)?;
    if hops.len() != usize::from(entries) {
        scope.findings().push(
            DiagnosticKind::LengthMismatch,
            Layer::Router,
            start,
            format!("route declares {entries} entries, {} decoded", hops.len()),
        );
    }

    Ok(RouteRequest {
        route_version,
        ni_version,
        entries,
        talk_mode,
        rest_nodes,
        route_length,
        route_offset,
        hops,
    })
}

/// Parse a route string into its hops.
pub fn parse_route_string(route: Bytes, scope: &mut Scope) -> Result<Vec<RouteHop>> {
    let mut reader = Reader::new(route);
    let mut hops = Vec::new();
    while !reader.is_empty() {
        let hop = RouteHop {
            host: reader.read_cstring("route.host")?,
            service: reader.read_cstring("route.service")?,
            password: reader.read_cstring("route.password")?,
        };
        trace!(host = %hop.host, service = %hop.service, "route hop");
        if hop.has_password() {
            let frame = scope.frame();
            scope.findings().push_credential(
                frame,
                CredentialKind::RoutePassword,
                hop.host.clone(),
                hop.password.clone(),
            );
        }
        hops.push(hop);
    }
    Ok(hops)
}

/// Serialize hops into a route string.
#[must_use]
pub fn encode_route_string(hops: &[RouteHop]) -> Vec<u8> {
    let mut out = Vec::new();
    for hop in hops {
        for part in [&hop.host, &hop.service, &hop.password] {
            out.extend_from_slice(part.as_bytes());
            out.push(0);
        }
    }
    out
}

/// Build a complete route request message.
///
/// The entry and remaining-hop counts are single bytes and saturate at 255.
#[must_use]
pub fn encode_route_request(hops: &[RouteHop], talk_mode: TalkMode) -> Vec<u8> {
    let route = encode_route_string(hops);
    let first_hop = hops.first().map_or(0, |hop| encode_route_string(std::slice::from_ref(hop)).len());
    let entries = u8::try_from(hops.len()).unwrap_or(u8::MAX);
    let wire_offset = u32::try_from(first_hop)
        .unwrap_or(u32::MAX)
        .saturating_sub(ROUTE_OFFSET_ADJUST);
    let mut out = Vec::with_capacity(NI_ROUTE.len() + ROUTE_HEADER_LEN + route.len());
    out.extend_from_slice(NI_ROUTE);
    out.push(ROUTE_VERSION);
    out.push(NI_VERSION);
    out.push(entries);
    out.push(talk_mode as u8);
    out.extend_from_slice(&[0, 0]);
    out.push(entries.saturating_sub(1));
    out.extend_from_slice(&u32::try_from(route.len()).unwrap_or(u32::MAX).to_be_bytes());
    out.extend_from_slice(&wire_offset.to_be_bytes());
    out.extend_from_slice(&route);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::findings::{FrameId, Findings};
    use proptest::prelude::*;

    fn hop(host: &str, service: &str, password: &str) -> RouteHop {
        RouteHop {
            host: host.into(),
            service: service.into(),
            password: password.into(),
        }
    }

    #[test]
    fn test_route_string_with_password() {
        let mut findings = Findings::new();
        let mut scope = Scope::new(FrameId(11), &mut findings, 4);
        let raw = Bytes::from_static(b"hostA\x003200\x00\x00hostB\x00sapdp01\x00secret\x00");
        let hops = parse_route_string(raw, &mut scope).unwrap();

        assert_eq!(hops, vec![hop("hostA", "3200", ""), hop("hostB", "sapdp01", "secret")]);
        assert_eq!(hops[0].port(), 3200);
        assert_eq!(hops[1].port(), 3201);
        assert_eq!(findings.credentials().len(), 1);
        assert_eq!(findings.credentials()[0].context, "hostB");
        assert_eq!(findings.credentials()[0].value, "secret");
        assert_eq!(findings.credentials()[0].frame, FrameId(11));
    }

    #[test]
    fn test_unterminated_hop_is_fatal() {
        let mut findings = Findings::new();
        let mut scope = Scope::new(FrameId(1), &mut findings, 4);
        let result = parse_route_string(Bytes::from_static(b"hostA\x003200"), &mut scope);
        assert!(matches!(result, Err(Error::UnterminatedString { field: "route.service", .. })));
    }

    #[test]
    fn test_service_translation() {
        assert_eq!(service_to_port("3299"), 3299);
        assert_eq!(service_to_port("sapdp00"), 3200);
        assert_eq!(service_to_port("sapgw42"), 3342);
        assert_eq!(service_to_port("sapms07"), 3607);
        assert_eq!(service_to_port("sapmsPRD"), 0);
        assert_eq!(service_to_port("sapdp"), 0);
        assert_eq!(service_to_port("http"), 0);
        assert_eq!(service_to_port("99999"), 0);
    }

    #[test]
    fn test_request_header_and_length_check() {
        let hops = vec![hop("client", "0", ""), hop("saprouter", "3299", ""), hop("app", "sapdp00", "")];
        let raw = encode_route_request(&hops, TalkMode::RoutIo);
        let mut findings = Findings::new();
        let mut scope = Scope::new(FrameId(1), &mut findings, 4);
        let request = decode_route_request(Bytes::copy_from_slice(&raw[NI_ROUTE.len()..]), &mut scope).unwrap();

        assert!(scope.findings().is_empty());
        assert_eq!(request.entries, 3);
        assert_eq!(request.route_offset, 10);
        assert_eq!(request.rest_nodes, 2);
        assert_eq!(TalkMode::from_u8(request.talk_mode), Some(TalkMode::RoutIo));
        assert_eq!(request.hops, hops);

        // Claim a longer route string than present.
        let mut truncated = raw[NI_ROUTE.len()..].to_vec();
        truncated[10] = truncated[10].wrapping_add(8);
        let request = decode_route_request(Bytes::from(truncated), &mut scope).unwrap();
        assert_eq!(request.hops, hops);
        assert_eq!(findings.count(DiagnosticKind::LengthMismatch), 1);
    }

    #[test]
    fn test_route_offset_adjustment() {
        let raw = encode_route_request(&[hop("client", "0", "")], TalkMode::MsgIo);
        let mut body = raw[NI_ROUTE.len()..].to_vec();
        assert_eq!(&body[11..15], &6u32.to_be_bytes());

        body[11..15].copy_from_slice(&0u32.to_be_bytes());
        let mut findings = Findings::new();
        let mut scope = Scope::new(FrameId(1), &mut findings, 4);
        let request = decode_route_request(Bytes::from(body.clone()), &mut scope).unwrap();
        assert_eq!(request.route_offset, 4);
        assert!(findings.is_empty());

        body[11..15].copy_from_slice(&u32::MAX.to_be_bytes());
        let mut scope = Scope::new(FrameId(1), &mut findings, 4);
        let request = decode_route_request(Bytes::from(body), &mut scope).unwrap();
        assert_eq!(request.route_offset, u32::MAX);
        assert_eq!(findings.count(DiagnosticKind::LengthMismatch), 1);
    }

    #[test]
    fn test_hop_counts_saturate() {
        let hops = vec![hop("h", "0", ""); 300];
        let raw = encode_route_request(&hops, TalkMode::RawIo);
        let body = &raw[NI_ROUTE.len()..];
        assert_eq!(body[2], u8::MAX);
        assert_eq!(body[6], u8::MAX - 1);
    }

    #[test]
    fn test_hop_display_hides_password() {
        assert_eq!(hop("h", "3299", "pw").to_string(), "/H/h/S/3299/P/***");
    }

    proptest! {
        #[test]
        fn prop_route_string_roundtrip(
            entries in proptest::collection::vec(
                ("[a-z0-9.-]{1,16}", any::<u16>(), "[A-Za-z0-9]{0,12}"),
                0..8,
            )
        ) {
            let hops: Vec<RouteHop> = entries
                .iter()
                .map(|(host, port, password)| hop(host, &port.to_string(), password))
                .collect();
            let mut findings = Findings::new();
            let mut scope = Scope::new(FrameId(1), &mut findings, 4);
            let parsed = parse_route_string(Bytes::from(encode_route_string(&hops)), &mut scope).unwrap();

            prop_assert_eq!(&parsed, &hops);
            for (parsed, (_, port, _)) in parsed.iter().zip(&entries) {
                prop_assert_eq!(parsed.port(), *port);
            }
            let with_password = hops.iter().filter(|h| h.has_password()).count();
            prop_assert_eq!(findings.credentials().len(), with_password);
        }
    }
}
