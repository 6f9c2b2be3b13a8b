//! Fixed-layout Diag item records and their decoders.
//!
//! Every decoder here receives the (already clamped) value bytes of one item
//! and returns its typed [`ItemValue`].

use bytes::Bytes;
use uuid::Uuid;

use super::item::ItemValue;
use super::support::SupportBits;
use crate::error::Result;
use crate::findings::{DiagnosticKind, Layer};
use crate::reader::{Reader, trim_text};
use crate::scope::Scope;

/// Screen event (SES), 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Ses {
    /// Event array
    pub event_array: u8,
    /// Event ids
    pub event_ids: [u8; 5],
    /// Screen flag
    pub screen_flag: u8,
    /// Modal number
    pub modal_no: u8,
    /// Cursor column
    pub x_pos: u8,
    /// Cursor row
    pub y_pos: u8,
    /// Internal mode
    pub imode: u8,
    /// Append flag
    pub flag_append: u8,
    /// Screen rows
    pub dim_row: u8,
    /// Screen columns
    pub dim_col: u8,
}

/// Set buffer address (SBA), 2 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Sba {
    /// Row
    pub y: u8,
    /// Column
    pub x: u8,
}

/// Start field extended (SFE), 3 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Sfe {
    /// First format byte
    pub format1: u8,
    /// Second format byte
    pub format2: u8,
    /// Third format byte
    pub format3: u8,
}

/// Cursor and list layout (CHL), 22 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Chl {
    /// Flags
    pub flag: u16,
    /// Cursor row
    pub current_row: u16,
    /// Cursor column
    pub current_col: u16,
    /// Scroll row
    pub scroll_row: u16,
    /// Scroll column
    pub scroll_col: u16,
    /// List start row
    pub list_row: u16,
    /// List start column
    pub list_col: u16,
    /// Area row
    pub area_row: u16,
    /// Area column
    pub area_col: u16,
    /// Visible rows
    pub visible_rows: u16,
    /// Visible columns
    pub visible_cols: u16,
}

/// Connect record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Connect {
    /// Diag protocol version
    pub protocol_version: u32,
    /// Code page
    pub code_page: u32,
    /// Workstation type
    pub ws_type: u32,
}

/// Rectangle in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Rect {
    /// Left edge
    pub left: u32,
    /// Top edge
    pub top: u32,
    /// Right edge
    pub right: u32,
    /// Bottom edge
    pub bottom: u32,
}

/// Width and height pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Dimensions {
    /// Height
    pub height: u32,
    /// Width
    pub width: u32,
}

/// One entry of an internal-mode UUID list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IModeUuid {
    /// Internal mode UUID
    pub uuid: Uuid,
    /// Active flag
    pub flag: u8,
}

/// Size of one [`IModeUuid`] entry.
pub const IMODE_UUID_ENTRY_LEN: usize = 17;

pub(super) fn ses(value: Bytes, _: &mut Scope) -> Result<ItemValue> {
    let mut reader = Reader::new(value);
    Ok(ItemValue::Ses(Ses {
        event_array: reader.read_u8("ses.event_array")?,
        event_ids: reader.read_fixed::<5>("ses.event_ids")?,
        screen_flag: reader.read_u8("ses.screen_flag")?,
        modal_no: reader.read_u8("ses.modal_no")?,
        x_pos: reader.read_u8("ses.x_pos")?,
        y_pos: reader.read_u8("ses.y_pos")?,
        imode: reader.read_u8("ses.imode")?,
        flag_append: reader.read_u8("ses.flag_append")?,
        dim_row: reader.read_u8("ses.dim_row")?,
        dim_col: reader.read_u8("ses.dim_col")?,
    }))
}

pub(super) fn sba(value: Bytes, _: &mut Scope) -> Result<ItemValue> {
    let mut reader = Reader::new(value);
    Ok(ItemValue::Sba(Sba {
        y: reader.read_u8("sba.y")?,
        x: reader.read_u8("sba.x")?,
    }))
}

pub(super) fn sfe(value: Bytes, _: &mut Scope) -> Result<ItemValue> {
    let mut reader = Reader::new(value);
    Ok(ItemValue::Sfe(Sfe {
        format1: reader.read_u8("sfe.format1")?,
        format2: reader.read_u8("sfe.format2")?,
        format3: reader.read_u8("sfe.format3")?,
    }))
}

pub(super) fn chl(value: Bytes, _: &mut Scope) -> Result<ItemValue> {
    let mut reader = Reader::new(value);
    let mut field = |name: &'static str| reader.read_u16(name);
    Ok(ItemValue::Chl(Chl {
        flag: field("chl.flag")?,
        current_row: field("chl.current_row")?,
        current_col: field("chl.current_col")?,
        scroll_row: field("chl.scroll_row")?,
        scroll_col: field("chl.scroll_col")?,
        list_row: field("chl.list_row")?,
        list_col: field("chl.list_col")?,
        area_row: field("chl.area_row")?,
        area_col: field("chl.area_col")?,
        visible_rows: field("chl.visible_rows")?,
        visible_cols: field("chl.visible_cols")?,
    }))
}

pub(super) fn connect(value: Bytes, _: &mut Scope) -> Result<ItemValue> {
    let mut reader = Reader::new(value);
    Ok(ItemValue::Connect(Connect {
        protocol_version: reader.read_u32("connect.protocol_version")?,
        code_page: reader.read_u32("connect.code_page")?,
        ws_type: reader.read_u32("connect.ws_type")?,
    }))
}

pub(super) fn rect(value: Bytes, _: &mut Scope) -> Result<ItemValue> {
    let mut reader = Reader::new(value);
    Ok(ItemValue::Rect(Rect {
        left: reader.read_u32("rect.left")?,
        top: reader.read_u32("rect.top")?,
        right: reader.read_u32("rect.right")?,
        bottom: reader.read_u32("rect.bottom")?,
    }))
}

pub(super) fn dimensions(value: Bytes, _: &mut Scope) -> Result<ItemValue> {
    let mut reader = Reader::new(value);
    Ok(ItemValue::Dimensions(Dimensions {
        height: reader.read_u32("dimensions.height")?,
        width: reader.read_u32("dimensions.width")?,
    }))
}

pub(super) fn text(value: Bytes, _: &mut Scope) -> Result<ItemValue> {
    Ok(ItemValue::Text(trim_text(&value)))
}

pub(super) fn shorts(value: Bytes, scope: &mut Scope) -> Result<ItemValue> {
    if value.len() % 2 != 0 {
        scope.findings().push(
            DiagnosticKind::LengthMismatch,
            Layer::Diag,
            value.len() - 1,
            "odd length for a list of 16-bit values, trailing byte ignored",
        );
    }
    Ok(ItemValue::Shorts(
        value
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect(),
    ))
}

pub(super) fn number_u16(value: Bytes, _: &mut Scope) -> Result<ItemValue> {
    Ok(ItemValue::Number(u32::from(Reader::new(value).read_u16("number")?)))
}

pub(super) fn number_u32(value: Bytes, _: &mut Scope) -> Result<ItemValue> {
    Ok(ItemValue::Number(Reader::new(value).read_u32("number")?))
}

pub(super) fn support_bits(value: Bytes, scope: &mut Scope) -> Result<ItemValue> {
    let bits = SupportBits::from_slice(&value)?;
    if value.len() > bits.as_bytes().len() {
        scope.findings().push(
            DiagnosticKind::LengthMismatch,
            Layer::Diag,
            bits.as_bytes().len(),
            format!("support bits carry {} trailing bytes", value.len() - bits.as_bytes().len()),
        );
    }
    Ok(ItemValue::SupportBits(bits))
}

pub(super) fn imode_uuid(value: Bytes, _: &mut Scope) -> Result<ItemValue> {
    let raw = Reader::new(value).read_fixed::<16>("imode.uuid")?;
    Ok(ItemValue::Uuid(Uuid::from_bytes(raw)))
}

pub(super) fn imode_uuids(value: Bytes, scope: &mut Scope) -> Result<ItemValue> {
    let total = value.len();
    let mut reader = Reader::new(value);
    let count = usize::from(reader.read_u8("imode_uuids.count")?);
    let expected = 1 + IMODE_UUID_ENTRY_LEN * count;
    if total != expected {
        scope.findings().push(
            DiagnosticKind::LengthMismatch,
            Layer::Diag,
            0,
            format!("imode uuid list of {count} entries needs {expected} bytes, item has {total}"),
        );
    }
    let mut entries = Vec::with_capacity(count.min(reader.remaining() / IMODE_UUID_ENTRY_LEN));
    while entries.len() < count && reader.remaining() >= IMODE_UUID_ENTRY_LEN {
        entries.push(IModeUuid {
            uuid: Uuid::from_bytes(reader.read_fixed::<16>("imode_uuids.uuid")?),
            flag: reader.read_u8("imode_uuids.flag")?,
        });
    }
    Ok(ItemValue::IModeUuids(entries))
}

pub(super) fn xml_blob(value: Bytes, _: &mut Scope) -> Result<ItemValue> {
    Ok(ItemValue::Text(String::from_utf8_lossy(&value).into_owned()))
}

pub(super) fn end_of_message(_: Bytes, _: &mut Scope) -> Result<ItemValue> {
    Ok(ItemValue::Empty)
}

pub(super) fn opaque(_: Bytes, _: &mut Scope) -> Result<ItemValue> {
    Ok(ItemValue::Opaque)
}

pub(super) fn rfc_delegation(value: Bytes, _: &mut Scope) -> Result<ItemValue> {
    Ok(ItemValue::RfcDelegation { len: value.len() })
}
