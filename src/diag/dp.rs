//! Dispatcher (DP) envelope
//!
//! Messages exchanged with the dispatcher during login carry a fixed
//! 200-byte envelope in front of the Diag header. All integers are
//! big-endian except the login item length, which is little-endian.

use std::fmt;

use crate::error::Result;
use crate::reader::Reader;

/// Size of the DP envelope.
pub const DP_HEADER_LEN: usize = 200;

/// Offset of the terminal name inside the envelope.
pub const DP_TERMINAL_OFFSET: usize = 81;

/// Width of the terminal name field.
pub const DP_TERMINAL_LEN: usize = 15;

/// Decoded DP envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DpHeader {
    /// Request id
    pub request_id: u32,
    /// Return code
    pub retcode: u8,
    /// Sender id
    pub sender_id: u8,
    /// Action type
    pub action_type: u8,
    /// Request info flags
    pub req_info: ReqInfo,
    /// Transaction id
    pub tid: u32,
    /// User id
    pub uid: u16,
    /// Mode
    pub mode: u8,
    /// Work process id
    pub wp_id: u32,
    /// Work process control block
    pub wp_ca_blk: u32,
    /// APPC control block
    pub appc_ca_blk: u32,
    /// Length of the login item that follows (little-endian on the wire)
    pub login_len: u32,
    /// New status
    pub new_stat: u8,
    /// Request queue id
    pub rq_id: u16,
    /// Terminal name
    pub terminal: String,
    /// Set when the envelope ran past the available bytes
    pub truncated: bool,
}

impl DpHeader {
    /// Decode the envelope, stopping early when bytes run out.
    ///
    /// A short buffer is not an error: the fields read so far are kept,
    /// `truncated` is set and the reader is left at the end of its buffer.
    pub fn decode(reader: &mut Reader) -> Self {
        let mut header = Self::default();
        if header.fill(reader).is_err() {
            header.truncated = true;
            reader.read_rest();
        }
        header
    }

    fn fill(&mut self, reader: &mut Reader) -> Result<()> {
        self.request_id = reader.read_u32("dp.request_id")?;
        self.retcode = reader.read_u8("dp.retcode")?;
        self.sender_id = reader.read_u8("dp.sender_id")?;
        self.action_type = reader.read_u8("dp.action_type")?;
        self.req_info = ReqInfo::from_u32(reader.read_u32("dp.req_info")?);
        self.tid = reader.read_u32("dp.tid")?;
        self.uid = reader.read_u16("dp.uid")?;
        self.mode = reader.read_u8("dp.mode")?;
        self.wp_id = reader.read_u32("dp.wp_id")?;
        self.wp_ca_blk = reader.read_u32("dp.wp_ca_blk")?;
        self.appc_ca_blk = reader.read_u32("dp.appc_ca_blk")?;
        self.login_len = reader.read_u32_le("dp.login_len")?;
        self.new_stat = reader.read_u8("dp.new_stat")?;
        reader.skip("dp.reserved", 4)?;
        self.rq_id = reader.read_u16("dp.rq_id")?;
        reader.skip("dp.reserved", 40)?;
        self.terminal = reader.read_fixed_string("dp.terminal", DP_TERMINAL_LEN)?;
        reader.skip("dp.reserved", DP_HEADER_LEN - DP_TERMINAL_OFFSET - DP_TERMINAL_LEN)?;
        Ok(())
    }

    /// Encode to the 200-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DP_HEADER_LEN);
        out.extend_from_slice(&self.request_id.to_be_bytes());
        out.push(self.retcode);
        out.push(self.sender_id);
        out.push(self.action_type);
        out.extend_from_slice(&self.req_info.as_u32().to_be_bytes());
        out.extend_from_slice(&self.tid.to_be_bytes());
        out.extend_from_slice(&self.uid.to_be_bytes());
        out.push(self.mode);
        out.extend_from_slice(&self.wp_id.to_be_bytes());
        out.extend_from_slice(&self.wp_ca_blk.to_be_bytes());
        out.extend_from_slice(&self.appc_ca_blk.to_be_bytes());
        out.extend_from_slice(&self.login_len.to_le_bytes());
        out.push(self.new_stat);
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&self.rq_id.to_be_bytes());
        out.extend_from_slice(&[0; 40]);
        let mut terminal = [b' '; DP_TERMINAL_LEN];
        let name = self.terminal.as_bytes();
        let len = name.len().min(DP_TERMINAL_LEN);
        terminal[..len].copy_from_slice(&name[..len]);
        out.extend_from_slice(&terminal);
        out.resize(DP_HEADER_LEN, 0);
        out
    }

    /// Name of the request id, if known.
    #[must_use]
    pub const fn request_name(&self) -> Option<&'static str> {
        match self.request_id {
            0x0000_0000 => Some("REQ_NOTHING"),
            0x0000_0001 => Some("REQ_DIA"),
            0x0000_0002 => Some("REQ_UPD"),
            0x0000_0003 => Some("REQ_ENQ"),
            0x0000_0004 => Some("REQ_BTC"),
            0x0000_0005 => Some("REQ_SPO"),
            0x0000_0006 => Some("REQ_UP2"),
            0xffff_ffff => Some("REQ_UNDEFINED"),
            _ => None,
        }
    }

    /// Name of the sender, if known.
    #[must_use]
    pub const fn sender_name(&self) -> Option<&'static str> {
        match self.sender_id {
            0x00 => Some("DISP"),
            0x01 => Some("WP"),
            0x02 => Some("GATEWAY"),
            0x03 => Some("ICMAN"),
            0xff => Some("UNDEFINED"),
            _ => None,
        }
    }

    /// Name of the action type, if known.
    #[must_use]
    pub const fn action_name(&self) -> Option<&'static str> {
        match self.action_type {
            0x00 => Some("NO_ACTION"),
            0x01 => Some("SEND_TO_DP"),
            0x02 => Some("SEND_TO_WP"),
            0x03 => Some("SEND_TO_TM"),
            0x04 => Some("SEND_TO_APPC"),
            0x05 => Some("SEND_TO_APPCTM"),
            0x06 => Some("SEND_TO_MSG"),
            0x07 => Some("SEND_TO_GW"),
            0x08 => Some("SEND_TO_ICMAN"),
            _ => None,
        }
    }

    /// Name of the new status, if known.
    #[must_use]
    pub const fn new_stat_name(&self) -> Option<&'static str> {
        match self.new_stat {
            0x00 => Some("NO_CHANGE"),
            0x01 => Some("WP_SLOT_FREE"),
            0x02 => Some("WAIT"),
            0x03 => Some("HOLD"),
            0x04 => Some("RUN"),
            0x05 => Some("STOP"),
            _ => None,
        }
    }
}

/// Request info flags (28 named bits in a 4-byte field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReqInfo(u32);

impl ReqInfo {
    /// Login request
    pub const LOGIN: u32 = 0x01 << 24;
    /// Logoff request
    pub const LOGOFF: u32 = 0x02 << 24;
    /// Shutdown request
    pub const SHUTDOWN: u32 = 0x04 << 24;
    /// Graphic terminal
    pub const GRAPHIC_TM: u32 = 0x08 << 24;
    /// ALE terminal
    pub const ALE_TM: u32 = 0x10 << 24;
    /// APPC server terminal
    pub const APPC_SERVER_TM: u32 = 0x20 << 24;
    /// Cancel mode
    pub const CANCEL_MODE: u32 = 0x40 << 24;
    /// Message terminal
    pub const MSG_TM: u32 = 0x80 << 24;
    /// Skip authority checks
    pub const NO_CHECK: u32 = 0x01 << 16;
    /// Synchronous RFC
    pub const SYNC_RFC: u32 = 0x02 << 16;
    /// Asynchronous RFC
    pub const ASYNC_RFC: u32 = 0x04 << 16;
    /// External request
    pub const EXTERNAL: u32 = 0x08 << 16;
    /// Block RFC
    pub const BLOCK_RFC: u32 = 0x10 << 16;
    /// CPIC error
    pub const CPIC_ERROR: u32 = 0x20 << 16;
    /// Internal mode
    pub const INTERNAL_MODE: u32 = 0x40 << 16;
    /// HTTP request
    pub const HTTP: u32 = 0x80 << 16;
    /// Enqueue request
    pub const ENQUEUE: u32 = 0x01 << 8;
    /// Update request
    pub const UPDATE: u32 = 0x02 << 8;
    /// Batch request
    pub const BATCH: u32 = 0x04 << 8;
    /// Spool request
    pub const SPOOL: u32 = 0x08 << 8;
    /// Start of a new mode
    pub const NEW_MODE: u32 = 0x10 << 8;
    /// Trace enabled
    pub const TRACE: u32 = 0x20 << 8;
    /// Dispatcher-internal
    pub const DP_INTERNAL: u32 = 0x40 << 8;
    /// Gateway request
    pub const GATEWAY: u32 = 0x80 << 8;
    /// Multi-login
    pub const MULTI_LOGIN: u32 = 0x01;
    /// Single sign-on ticket
    pub const SSO_TICKET: u32 = 0x02;
    /// Client certificate
    pub const X509: u32 = 0x04;
    /// Web GUI session
    pub const WEBGUI: u32 = 0x08;

    const NAMES: [(u32, &'static str); 28] = [
        (Self::LOGIN, "LOGIN"),
        (Self::LOGOFF, "LOGOFF"),
        (Self::SHUTDOWN, "SHUTDOWN"),
        (Self::GRAPHIC_TM, "GRAPHIC_TM"),
        (Self::ALE_TM, "ALE_TM"),
        (Self::APPC_SERVER_TM, "APPC_SERVER_TM"),
        (Self::CANCEL_MODE, "CANCEL_MODE"),
        (Self::MSG_TM, "MSG_TM"),
        (Self::NO_CHECK, "NO_CHECK"),
        (Self::SYNC_RFC, "SYNC_RFC"),
        (Self::ASYNC_RFC, "ASYNC_RFC"),
        (Self::EXTERNAL, "EXTERNAL"),
        (Self::BLOCK_RFC, "BLOCK_RFC"),
        (Self::CPIC_ERROR, "CPIC_ERROR"),
        (Self::INTERNAL_MODE, "INTERNAL_MODE"),
        (Self::HTTP, "HTTP"),
        (Self::ENQUEUE, "ENQUEUE"),
        (Self::UPDATE, "UPDATE"),
        (Self::BATCH, "BATCH"),
        (Self::SPOOL, "SPOOL"),
        (Self::NEW_MODE, "NEW_MODE"),
        (Self::TRACE, "TRACE"),
        (Self::DP_INTERNAL, "DP_INTERNAL"),
        (Self::GATEWAY, "GATEWAY"),
        (Self::MULTI_LOGIN, "MULTI_LOGIN"),
        (Self::SSO_TICKET, "SSO_TICKET"),
        (Self::X509, "X509"),
        (Self::WEBGUI, "WEBGUI"),
    ];

    /// Create from the raw field.
    #[must_use]
    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    /// Convert to the raw field.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Check whether a flag is set
    #[must_use]
    pub const fn has(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    /// Names of the set flags. Bits without a name are ignored.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMES
            .into_iter()
            .filter(move |(bit, _)| self.has(*bit))
            .map(|(_, name)| name)
    }
}

impl fmt::Display for ReqInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<_> = self.names().collect();
        if parts.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", parts.join(" | "))
        }
    }
}
