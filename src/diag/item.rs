//! Diag item stream
//!
//! A Diag body is a flat sequence of tagged items. Application items
//! (`APPL`, `APPL4`) carry an `(id, sid)` pair and an explicit length; the
//! other item types have a fixed, table-driven length. Decoding is
//! dispatched through an explicit table keyed by the `(type, id, sid)` tag.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use bytes::Bytes;
use tracing::trace;
use uuid::Uuid;

use super::atom::{self, AtomGroup};
use super::event::{self, ControlProperty, UiEvent};
use super::menu::{self, MenuEntry};
use super::records::{self, Chl, Connect, Dimensions, IModeUuid, Rect, Sba, Ses, Sfe};
use super::support::SupportBits;
use crate::error::Result;
use crate::findings::{DiagnosticKind, Layer};
use crate::reader::Reader;
use crate::scope::Scope;

/// Item type codes.
pub mod item_type {
    /// Screen event
    pub const SES: u8 = 0x01;
    /// Icon
    pub const ICO: u8 = 0x02;
    /// Title
    pub const TIT: u8 = 0x03;
    /// Legacy message
    pub const MESSAGE: u8 = 0x07;
    /// OK code, length unknown
    pub const OKC: u8 = 0x08;
    /// Cursor and list layout
    pub const CHL: u8 = 0x09;
    /// Start field extended
    pub const SFE: u8 = 0x0a;
    /// Set buffer address
    pub const SBA: u8 = 0x0b;
    /// End of message
    pub const EOM: u8 = 0x0c;
    /// Application item, 16-bit length
    pub const APPL: u8 = 0x10;
    /// Data stream (XML blob), 32-bit length
    pub const XMLBLOB: u8 = 0x11;
    /// Application item, 32-bit length
    pub const APPL4: u8 = 0x12;
    /// Selection
    pub const SLC: u8 = 0x13;
    /// Set buffer address, second form
    pub const SBA2: u8 = 0x15;
}

/// Application item ids.
pub mod appl_id {
    /// User-side data
    pub const ST_USER: u8 = 0x04;
    /// System information
    pub const ST_R3INFO: u8 = 0x06;
    /// RFC embedding
    pub const RFC_TR: u8 = 0x08;
    /// Dynamic screen
    pub const DYNT: u8 = 0x09;
    /// Menu
    pub const MNUENTRY: u8 = 0x0b;
    /// Variable info
    pub const VARINFO: u8 = 0x0c;
    /// Controls
    pub const CONTROL: u8 = 0x0e;
    /// UI events
    pub const UI_EVENT: u8 = 0x0f;
}

/// How the value length of an item type is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LengthRule {
    Fixed(usize),
    U16,
    U32,
    Unknown,
}

fn length_rule(kind: u8) -> Option<LengthRule> {
    use item_type::*;
    Some(match kind {
        SES => LengthRule::Fixed(16),
        ICO => LengthRule::Fixed(20),
        TIT => LengthRule::Fixed(3),
        MESSAGE => LengthRule::Fixed(76),
        OKC => LengthRule::Unknown,
        CHL => LengthRule::Fixed(22),
        SFE => LengthRule::Fixed(3),
        SBA => LengthRule::Fixed(2),
        EOM => LengthRule::Fixed(0),
        APPL => LengthRule::U16,
        XMLBLOB | APPL4 => LengthRule::U32,
        SLC => LengthRule::Fixed(2),
        SBA2 => LengthRule::Fixed(36),
        _ => return None,
    })
}

/// Item tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ItemTag {
    /// Item type
    pub item_type: u8,
    /// Application id (`APPL`/`APPL4` only)
    pub id: Option<u8>,
    /// Application sub-id (`APPL`/`APPL4` only)
    pub sid: Option<u8>,
}

impl ItemTag {
    /// Tag of a bare item type.
    #[must_use]
    pub const fn bare(item_type: u8) -> Self {
        Self {
            item_type,
            id: None,
            sid: None,
        }
    }

    /// Tag of an application item.
    #[must_use]
    pub const fn appl(item_type: u8, id: u8, sid: u8) -> Self {
        Self {
            item_type,
            id: Some(id),
            sid: Some(sid),
        }
    }

    const fn wildcard(self) -> Self {
        Self { sid: None, ..self }
    }
}

impl fmt::Display for ItemTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.id, self.sid) {
            (Some(id), Some(sid)) => write!(f, "{:#04x}/{id:#04x}/{sid:#04x}", self.item_type),
            _ => write!(f, "{:#04x}", self.item_type),
        }
    }
}

/// Decoded item value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ItemValue {
    /// Item without a value
    Empty,
    /// Value kept as raw bytes only
    Opaque,
    /// Screen event
    Ses(Ses),
    /// Set buffer address
    Sba(Sba),
    /// Start field extended
    Sfe(Sfe),
    /// Cursor and list layout
    Chl(Chl),
    /// Connect record
    Connect(Connect),
    /// Rectangle
    Rect(Rect),
    /// Width and height
    Dimensions(Dimensions),
    /// Text
    Text(String),
    /// Number
    Number(u32),
    /// List of 16-bit values
    Shorts(Vec<u16>),
    /// Single UUID
    Uuid(Uuid),
    /// Internal mode UUID list
    IModeUuids(Vec<IModeUuid>),
    /// Support bits
    SupportBits(SupportBits),
    /// Dynamic screen atoms
    Atoms(Vec<AtomGroup>),
    /// Menu entries
    Menu(Vec<MenuEntry>),
    /// UI event source
    UiEvent(UiEvent),
    /// Control properties
    ControlProperties(Vec<ControlProperty>),
    /// Embedded RFC data; decoding is handed off to an RFC decoder
    RfcDelegation {
        /// Bytes that would be delegated
        len: usize,
    },
}

/// One decoded item.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DiagItem {
    /// Offset of the item type byte within the item stream
    pub offset: usize,
    /// Tag
    pub tag: ItemTag,
    /// Item name, if the tag is known
    pub name: Option<&'static str>,
    /// Declared value length
    pub declared_len: usize,
    /// Value bytes as present on the wire (clamped)
    pub raw: Bytes,
    /// Decoded value
    pub value: ItemValue,
}

type DecodeFn = fn(Bytes, &mut Scope) -> Result<ItemValue>;

struct ItemSpec {
    tag: ItemTag,
    name: &'static str,
    decode: DecodeFn,
}

const fn bare(item_type: u8, name: &'static str, decode: DecodeFn) -> ItemSpec {
    ItemSpec {
        tag: ItemTag::bare(item_type),
        name,
        decode,
    }
}

const fn appl(item_type: u8, id: u8, sid: u8, name: &'static str, decode: DecodeFn) -> ItemSpec {
    ItemSpec {
        tag: ItemTag::appl(item_type, id, sid),
        name,
        decode,
    }
}

const fn appl_any(item_type: u8, id: u8, name: &'static str, decode: DecodeFn) -> ItemSpec {
    ItemSpec {
        tag: ItemTag {
            item_type,
            id: Some(id),
            sid: None,
        },
        name,
        decode,
    }
}

#[rustfmt::skip]
static ITEM_SPECS: &[ItemSpec] = {
    use appl_id::*;
    use item_type::*;
    &[
        bare(SES, "SES", records::ses),
        bare(ICO, "ICO", records::text),
        bare(TIT, "TIT", records::text),
        bare(MESSAGE, "MESSAGE", records::text),
        bare(CHL, "CHL", records::chl),
        bare(SFE, "SFE", records::sfe),
        bare(SBA, "SBA", records::sba),
        bare(EOM, "EOM", records::end_of_message),
        bare(XMLBLOB, "XMLBLOB", records::xml_blob),
        bare(SLC, "SLC", records::number_u16),
        bare(SBA2, "SBA2", records::opaque),

        appl(APPL, ST_USER, 0x02, "CONNECT", records::connect),
        appl(APPL, ST_USER, 0x03, "SELECTEDRECT", records::rect),
        appl(APPL, ST_USER, 0x04, "FONTMETRIC", records::shorts),
        appl(APPL, ST_USER, 0x06, "GUITIME", records::text),
        appl(APPL, ST_USER, 0x07, "GUITIMEZONE", records::text),
        appl(APPL, ST_USER, 0x08, "TURNTIME", records::number_u32),
        appl(APPL, ST_USER, 0x09, "GUIVERSION", records::text),
        appl(APPL, ST_USER, 0x0b, "SUPPORTDATA", records::support_bits),
        appl(APPL4, ST_USER, 0x0b, "SUPPORTDATA", records::support_bits),
        appl(APPL, ST_USER, 0x0c, "RFC_CONNECT", records::text),
        appl(APPL, ST_USER, 0x0d, "WINDOWSIZE", records::dimensions),

        appl(APPL, ST_R3INFO, 0x01, "MODENUMBER", records::text),
        appl(APPL, ST_R3INFO, 0x02, "DBNAME", records::text),
        appl(APPL, ST_R3INFO, 0x03, "CPUNAME", records::text),
        appl(APPL, ST_R3INFO, 0x04, "RFC_TRACE", records::text),
        appl(APPL, ST_R3INFO, 0x05, "GUI_THEME", records::text),
        appl(APPL, ST_R3INFO, 0x06, "TOOLBAR", records::text),
        appl(APPL, ST_R3INFO, 0x0c, "CODEPAGE_APP_SERVER", records::text),
        appl(APPL, ST_R3INFO, 0x0d, "CODEPAGE_DIAG_GUI", records::text),
        appl(APPL, ST_R3INFO, 0x11, "DIAGVERSION", records::number_u16),
        appl(APPL, ST_R3INFO, 0x14, "AUTOLOGOUT_TIME", records::number_u32),
        appl(APPL, ST_R3INFO, 0x15, "DBSID", records::text),
        appl(APPL, ST_R3INFO, 0x16, "KERNEL_VERSION", records::text),
        appl(APPL, ST_R3INFO, 0x1a, "SESSION_TITLE", records::text),
        appl(APPL, ST_R3INFO, 0x1e, "IMODEUUID", records::imode_uuid),
        appl(APPL, ST_R3INFO, 0x1f, "IMODEUUIDS", records::imode_uuids),

        appl(APPL, VARINFO, 0x04, "AREASIZE", records::dimensions),
        appl(APPL, VARINFO, 0x08, "OKCODE", records::text),
        appl(APPL, VARINFO, 0x09, "SESSION_TITLE", records::text),
        appl(APPL, VARINFO, 0x0a, "SESSION_ICON", records::text),
        appl(APPL, VARINFO, 0x1c, "TRANSACTION_CODE", records::text),
        appl(APPL, VARINFO, 0x1d, "CONTAINER_LOOP", records::shorts),

        appl(APPL, DYNT, 0x01, "DYNT_FOCUS", records::number_u32),
        appl(APPL, DYNT, 0x02, "DYNT_ATOM", atom::decode_atoms),
        appl(APPL4, DYNT, 0x02, "DYNT_ATOM", atom::decode_atoms),
        appl(APPL4, DYNT, 0x10, "DYNT_TABSTRIP_ATOM", atom::decode_atoms),

        appl_any(APPL4, MNUENTRY, "MNUENTRY", menu::decode_menu),
        appl(APPL, CONTROL, 0x01, "CONTROL_PROPERTIES", event::decode_control_properties),
        appl(APPL, UI_EVENT, 0x01, "UI_EVENT_SOURCE", event::decode_ui_event),
        appl_any(APPL, RFC_TR, "RFC_TR", records::rfc_delegation),
    ]
};

fn registry() -> &'static HashMap<ItemTag, &'static ItemSpec> {
    static REGISTRY: OnceLock<HashMap<ItemTag, &'static ItemSpec>> = OnceLock::new();
    REGISTRY.get_or_init(|| ITEM_SPECS.iter().map(|spec| (spec.tag, spec)).collect())
}

fn lookup(tag: ItemTag) -> Option<&'static ItemSpec> {
    let registry = registry();
    registry
        .get(&tag)
        .or_else(|| registry.get(&tag.wildcard()))
        .copied()
}

/// Name of a tag, if it has a decoder.
#[must_use]
pub fn item_name(tag: ItemTag) -> Option<&'static str> {
    lookup(tag).map(|spec| spec.name)
}

/// Number of tag entries in the dispatch table.
#[must_use]
pub fn known_item_count() -> usize {
    ITEM_SPECS.len()
}

/// Parse an item stream.
///
/// Never fails: problems are reported through the scope's findings and the
/// affected item keeps its raw bytes with an [`ItemValue::Opaque`] value.
pub fn parse_items(buf: Bytes, scope: &mut Scope) -> Vec<DiagItem> {
    let mut reader = Reader::new(buf);
    let mut items = Vec::new();

    while !reader.is_empty() {
        let offset = reader.position();
        match next_item(&mut reader, scope) {
            Ok((item, more)) => {
                items.push(item);
                if !more {
                    break;
                }
            }
            Err(err) => {
                scope.findings().push_error(Layer::Diag, offset, &err);
                break;
            }
        }
    }

    trace!(items = items.len(), "diag item stream");
    items
}

fn next_item(reader: &mut Reader, scope: &mut Scope) -> Result<(DiagItem, bool)> {
    let offset = reader.position();
    let kind = reader.read_u8("item.type")?;
    let tag = if matches!(kind, item_type::APPL | item_type::APPL4) {
        ItemTag::appl(kind, reader.read_u8("item.id")?, reader.read_u8("item.sid")?)
    } else {
        ItemTag::bare(kind)
    };

    let declared_len = match length_rule(kind) {
        Some(LengthRule::Fixed(len)) => len,
        Some(LengthRule::U16) => usize::from(reader.read_u16("item.length")?),
        Some(LengthRule::U32) => usize::try_from(reader.read_u32("item.length")?).unwrap_or(usize::MAX),
        Some(LengthRule::Unknown) | None => {
            let raw = reader.read_rest();
            let (diag_kind, name) = if kind == item_type::OKC {
                (DiagnosticKind::LengthMismatch, Some("OKC"))
            } else {
                (DiagnosticKind::UnrecognizedTag, None)
            };
            scope.findings().push(
                diag_kind,
                Layer::Diag,
                offset,
                format!(
                    "item type {kind:#04x} has no known length, {} remaining bytes kept opaque",
                    raw.len()
                ),
            );
            let item = DiagItem {
                offset,
                tag,
                name,
                declared_len: raw.len(),
                raw,
                value: ItemValue::Opaque,
            };
            return Ok((item, false));
        }
    };

    let value_offset = reader.position();
    let (raw, clamped) = reader.read_clamped(declared_len);
    if clamped {
        scope.findings().push(
            DiagnosticKind::LengthMismatch,
            Layer::Diag,
            value_offset,
            format!("item {tag} declares {declared_len} bytes, {} available", raw.len()),
        );
    }

    let spec = lookup(tag);
    let value = match spec {
        Some(spec) => match (spec.decode)(raw.clone(), scope) {
            Ok(value) => value,
            Err(err) => {
                scope.findings().push_error(Layer::Diag, value_offset, &err);
                ItemValue::Opaque
            }
        },
        None => {
            scope.findings().push(
                DiagnosticKind::UnrecognizedTag,
                Layer::Diag,
                offset,
                format!("unrecognized item {tag}"),
            );
            ItemValue::Opaque
        }
    };

    trace!(%tag, len = raw.len(), "diag item");
    let item = DiagItem {
        offset,
        tag,
        name: spec.map(|spec| spec.name),
        declared_len,
        raw,
        value,
    };
    Ok((item, true))
}

/// Encode an application item with the length width its type requires.
#[must_use]
pub fn encode_appl(kind: u8, id: u8, sid: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![kind, id, sid];
    if kind == item_type::APPL4 {
        out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    } else {
        out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    }
    out.extend_from_slice(value);
    out
}
