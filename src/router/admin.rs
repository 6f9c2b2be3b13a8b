//! Router administration, error and control messages.

use std::fmt;

use bytes::Bytes;

use crate::error::Result;
use crate::findings::{CredentialKind, DiagnosticKind, Layer};
use crate::reader::Reader;
use crate::scope::Scope;
use crate::snc::{self, SncFrame};

/// Admin message eyecatcher, terminator included.
pub const ROUTER_ADM: &[u8; 11] = b"ROUTER_ADM\0";

/// Error/control message eyecatcher, terminator included.
pub const NI_RTERR: &[u8; 9] = b"NI_RTERR\0";

/// Marker framing a router error text.
pub const ERROR_TEXT_EYECATCHER: &str = "*ERR*";

/// Names of the NUL-separated fields of an error text, in wire order.
pub const ERROR_TEXT_FIELDS: [&str; 16] = [
    "eyecatcher",
    "counter",
    "error",
    "return_code",
    "component",
    "release",
    "version",
    "module",
    "line",
    "detail",
    "time",
    "system_call",
    "errno",
    "errno_text",
    "error_count",
    "location",
];

/// Admin command codes.
pub mod command {
    /// Information request, may carry a password
    pub const INFORMATION_REQUEST: u8 = 2;
    /// Reload the route permission table
    pub const NEW_ROUTE_TABLE_REQUEST: u8 = 3;
    /// Toggle tracing
    pub const TOGGLE_TRACE_REQUEST: u8 = 4;
    /// Stop the router
    pub const STOP_REQUEST: u8 = 5;
    /// Cancel routes by client id
    pub const CANCEL_ROUTE_REQUEST: u8 = 6;
    /// Dump buffers
    pub const DUMP_BUFFERS_REQUEST: u8 = 7;
    /// Flush buffers
    pub const FLUSH_BUFFERS_REQUEST: u8 = 8;
    /// Soft shutdown
    pub const SOFT_SHUTDOWN_REQUEST: u8 = 9;
    /// Set the trace peer
    pub const SET_TRACE_PEER: u8 = 10;
    /// Clear the trace peer
    pub const CLEAR_TRACE_PEER: u8 = 11;
    /// Trace connections by client id
    pub const TRACE_CONNECTION: u8 = 12;
    /// Trace connections by client id, second form
    pub const TRACE_CONNECTION_2: u8 = 13;
    /// Hide error information
    pub const HIDE_ERROR_INFORMATION: u8 = 14;
}

/// Name of an admin command, if known.
#[must_use]
pub const fn command_name(code: u8) -> Option<&'static str> {
    use command::*;
    Some(match code {
        INFORMATION_REQUEST => "INFORMATION_REQUEST",
        NEW_ROUTE_TABLE_REQUEST => "NEW_ROUTE_TABLE_REQUEST",
        TOGGLE_TRACE_REQUEST => "TOGGLE_TRACE_REQUEST",
        STOP_REQUEST => "STOP_REQUEST",
        CANCEL_ROUTE_REQUEST => "CANCEL_ROUTE_REQUEST",
        DUMP_BUFFERS_REQUEST => "DUMP_BUFFERS_REQUEST",
        FLUSH_BUFFERS_REQUEST => "FLUSH_BUFFERS_REQUEST",
        SOFT_SHUTDOWN_REQUEST => "SOFT_SHUTDOWN_REQUEST",
        SET_TRACE_PEER => "SET_TRACE_PEER",
        CLEAR_TRACE_PEER => "CLEAR_TRACE_PEER",
        TRACE_CONNECTION => "TRACE_CONNECTION",
        TRACE_CONNECTION_2 => "TRACE_CONNECTION_2",
        HIDE_ERROR_INFORMATION => "HIDE_ERROR_INFORMATION",
        _ => return None,
    })
}

/// Command-specific part of an admin message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum AdminBody {
    /// Command without a body
    None,
    /// Information request
    InfoRequest {
        /// Info password, when one was sent
        password: Option<String>,
    },
    /// Client ids the command applies to
    Clients(Vec<u32>),
    /// Trace peer address
    TracePeer(String),
}

/// Decoded admin message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AdminMessage {
    /// Admin protocol version
    pub version: u8,
    /// Command code
    pub command: u8,
    /// Command body
    pub body: AdminBody,
}

impl AdminMessage {
    /// Command name, if known.
    #[must_use]
    pub const fn command_name(&self) -> Option<&'static str> {
        command_name(self.command)
    }
}

/// Decode an admin message body (the bytes after [`ROUTER_ADM`]).
pub fn decode_admin(body: Bytes, scope: &mut Scope) -> Result<AdminMessage> {
    use command::*;
    let mut reader = Reader::new(body);
    let version = reader.read_u8("admin.version")?;
    let command = reader.read_u8("admin.command")?;

    let body = match command {
        INFORMATION_REQUEST => {
            if reader.remaining() >= 2 {
                reader.skip("admin.reserved", 2)?;
            }
            let password = if reader.is_empty() {
                None
            } else {
                Some(reader.read_cstring_lenient())
            };
            if let Some(password) = password.as_ref().filter(|p| !p.is_empty()) {
                let frame = scope.frame();
                scope.findings().push_credential(
                    frame,
                    CredentialKind::AdminPassword,
                    "router info request",
                    password.clone(),
                );
            }
            AdminBody::InfoRequest { password }
        }
        CANCEL_ROUTE_REQUEST | TRACE_CONNECTION | TRACE_CONNECTION_2 => {
            reader.skip("admin.reserved", 2)?;
            let count = reader.read_u16("admin.client_count")?;
            let available = reader.remaining() / 4;
            if usize::from(count) > available {
                scope.findings().push(
                    DiagnosticKind::LengthMismatch,
                    Layer::Router,
                    reader.position(),
                    format!("admin message lists {count} clients, room for {available}"),
                );
            }
            let mut clients = Vec::with_capacity(usize::from(count).min(available));
            for _ in 0..usize::from(count).min(available) {
                clients.push(reader.read_u32("admin.client_id")?);
            }
            AdminBody::Clients(clients)
        }
        SET_TRACE_PEER | CLEAR_TRACE_PEER => {
            reader.skip("admin.reserved", 2)?;
            AdminBody::TracePeer(reader.read_cstring("admin.peer")?)
        }
        _ => AdminBody::None,
    };

    Ok(AdminMessage {
        version,
        command,
        body,
    })
}

/// Control opcodes carried by NI_RTERR messages.
pub mod opcode {
    /// Error information
    pub const ERROR_INFORMATION: u8 = 0;
    /// Version request
    pub const VERSION_REQUEST: u8 = 1;
    /// Version response
    pub const VERSION_RESPONSE: u8 = 2;
    /// Send handle
    pub const SEND_HANDLE: u8 = 5;
    /// Send socket
    pub const SEND_SOCKET: u8 = 6;
    /// Ping
    pub const PING: u8 = 8;
    /// SNC request
    pub const SNC_REQUEST: u8 = 70;
    /// SNC handshake complete
    pub const SNC_HANDSHAKE_COMPLETE: u8 = 71;
}

/// Name of a control opcode, if known.
#[must_use]
pub const fn opcode_name(code: u8) -> Option<&'static str> {
    use opcode::*;
    Some(match code {
        ERROR_INFORMATION => "ERROR_INFORMATION",
        VERSION_REQUEST => "VERSION_REQUEST",
        VERSION_RESPONSE => "VERSION_RESPONSE",
        SEND_HANDLE => "SEND_HANDLE",
        SEND_SOCKET => "SEND_SOCKET",
        PING => "PING",
        SNC_REQUEST => "SNC_REQUEST",
        SNC_HANDSHAKE_COMPLETE => "SNC_HANDSHAKE_COMPLETE",
        _ => return None,
    })
}

/// Whether an opcode belongs to SNC negotiation.
#[must_use]
pub const fn is_snc_opcode(code: u8) -> bool {
    matches!(code, opcode::SNC_REQUEST | opcode::SNC_HANDSHAKE_COMPLETE)
}

/// One named field of an error text.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ErrorField {
    /// Field name
    pub name: String,
    /// Field value
    pub value: String,
}

/// Router error information.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ErrorInfo {
    /// Message version
    pub version: u8,
    /// Return code
    pub return_code: i32,
    /// Named fields of the error text
    pub fields: Vec<ErrorField>,
}

impl ErrorInfo {
    /// Value of a named field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "router error {}: {}",
            self.return_code,
            self.field("error").unwrap_or("")
        )
    }
}

/// Router control message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ControlMessage {
    /// Message version
    pub version: u8,
    /// Opcode
    pub opcode: u8,
    /// Return code
    pub return_code: i32,
    /// Control text
    pub text: Bytes,
    /// SNC frame carried in the text of SNC negotiation messages
    pub snc: Option<SncFrame>,
}

impl ControlMessage {
    /// Opcode name, if known.
    #[must_use]
    pub const fn opcode_name(&self) -> Option<&'static str> {
        opcode_name(self.opcode)
    }
}

/// Decoded NI_RTERR message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RtErr {
    /// Error information (opcode 0)
    Error(ErrorInfo),
    /// Control message (any other opcode)
    Control(ControlMessage),
}

/// Decode an NI_RTERR body (the bytes after [`NI_RTERR`]).
pub fn decode_rterr(body: Bytes, scope: &mut Scope) -> Result<RtErr> {
    let mut reader = Reader::new(body);
    let version = reader.read_u8("rterr.version")?;
    let opcode = reader.read_u8("rterr.opcode")?;
    reader.skip("rterr.reserved", 1)?;
    let return_code = reader.read_i32("rterr.return_code")?;
    let text_length = reader.read_u32("rterr.text_length")?;

    let text_offset = reader.position() + NI_RTERR.len();
    let (text, clamped) = reader.read_clamped(usize::try_from(text_length).unwrap_or(usize::MAX));
    if clamped {
        scope.findings().push(
            DiagnosticKind::LengthMismatch,
            Layer::Router,
            text_offset,
            format!("text length {text_length} exceeds the {} bytes available", text.len()),
        );
    }

    if opcode == opcode::ERROR_INFORMATION {
        return Ok(RtErr::Error(ErrorInfo {
            version,
            return_code,
            fields: split_error_text(&text, text_offset, scope),
        }));
    }

    let snc = if is_snc_opcode(opcode) && snc::is_snc_frame(&text) {
        let mut inner = scope.descend()?;
        match snc::unwrap_frame(text.clone(), inner.findings()) {
            Ok(frame) => Some(frame),
            Err(err) => {
                inner.findings().push_error(Layer::Snc, 0, &err);
                None
            }
        }
    } else {
        None
    };

    Ok(RtErr::Control(ControlMessage {
        version,
        opcode,
        return_code,
        text,
        snc,
    }))
}

fn split_error_text(text: &[u8], offset: usize, scope: &mut Scope) -> Vec<ErrorField> {
    let mut parts: Vec<&[u8]> = text.split(|&b| b == 0).collect();
    while parts.last().is_some_and(|part| part.is_empty()) {
        parts.pop();
    }
    if parts.first().is_none_or(|part| *part != ERROR_TEXT_EYECATCHER.as_bytes()) {
        scope.findings().push(
            DiagnosticKind::MalformedStructure,
            Layer::Router,
            offset,
            "error text does not start with the *ERR* eyecatcher",
        );
    }
    parts
        .into_iter()
        .enumerate()
        .map(|(idx, part)| ErrorField {
            name: ERROR_TEXT_FIELDS
                .get(idx)
                .map_or_else(|| format!("field_{idx}"), |name| (*name).to_owned()),
            value: String::from_utf8_lossy(part).into_owned(),
        })
        .collect()
}

/// Build an NI_RTERR message. Used by tests and benches.
#[must_use]
pub fn encode_rterr(opcode: u8, return_code: i32, text: &[u8]) -> Vec<u8> {
    let mut out = NI_RTERR.to_vec();
    out.push(2);
    out.push(opcode);
    out.push(0);
    out.extend_from_slice(&return_code.to_be_bytes());
    out.extend_from_slice(&(text.len() as u32).to_be_bytes());
    out.extend_from_slice(text);
    out
}

/// Build an error text from field values.
#[must_use]
pub fn encode_error_text(values: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        out.extend_from_slice(value.as_bytes());
        out.push(0);
    }
    out
}
