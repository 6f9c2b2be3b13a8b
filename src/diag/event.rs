//! UI event source and control property records

use std::fmt;

use bytes::Bytes;

use super::item::ItemValue;
use crate::error::Result;
use crate::findings::{DiagnosticKind, Layer};
use crate::reader::Reader;
use crate::scope::Scope;

/// UI event validity flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EventValid(u8);

impl EventValid {
    /// Menu position is valid
    pub const MENU_POS: u8 = 0x01;
    /// Control position is valid
    pub const CONTROL_POS: u8 = 0x02;
    /// Navigation data follows
    pub const NAVIGATION_DATA: u8 = 0x04;
    /// Function key data follows
    pub const FUNCTIONKEY_DATA: u8 = 0x08;

    const NAMES: [(u8, &'static str); 4] = [
        (Self::MENU_POS, "MENU_POS"),
        (Self::CONTROL_POS, "CONTROL_POS"),
        (Self::NAVIGATION_DATA, "NAVIGATION_DATA"),
        (Self::FUNCTIONKEY_DATA, "FUNCTIONKEY_DATA"),
    ];

    /// Create from byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        Self(value)
    }

    /// Check whether a flag is set
    #[must_use]
    pub const fn has(self, flag: u8) -> bool {
        self.0 & flag != 0
    }
}

impl fmt::Display for EventValid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<_> = Self::NAMES
            .iter()
            .filter(|(bit, _)| self.has(*bit))
            .map(|(_, name)| *name)
            .collect();
        if parts.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", parts.join(" | "))
        }
    }
}

/// Name of a UI event type, if known.
#[must_use]
pub const fn event_type_name(value: u16) -> Option<&'static str> {
    Some(match value {
        1 => "SELECT",
        2 => "HE",
        3 => "VALUE_HELP",
        6 => "FUNCTIONKEY",
        7 => "BUTTONPRESSED",
        8 => "RADIOBUTTONPRESSED",
        10 => "CHECKBUTTONPRESSED",
        11 => "MENUSELECT",
        12 => "TABSTRIPSELECT",
        13 => "CONTROLEVENT",
        14 => "NAVIGATION",
        15 => "CONTEXTMENU",
        16 => "SCROLL",
        _ => return None,
    })
}

/// Name of a UI control type, if known.
#[must_use]
pub const fn control_type_name(value: u16) -> Option<&'static str> {
    Some(match value {
        0 => "NONE",
        1 => "FIELD",
        2 => "RADIOBUTTON",
        3 => "CHECKBUTTON",
        4 => "MENUBUTTON",
        5 => "TOOLBARBUTTON",
        6 => "STANDARDTOOLBARBUTTON",
        7 => "PUSHBUTTON",
        8 => "TABLEVIEW",
        9 => "TABSTRIP",
        10 => "LIST",
        11 => "CONTROL",
        12 => "MENU",
        _ => return None,
    })
}

/// Decoded UI event source.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UiEvent {
    /// Validity flags
    pub valid: EventValid,
    /// Event type
    pub event_type: u16,
    /// Control type
    pub control_type: u16,
    /// Navigation code, when navigation data is present
    pub navigation: Option<u8>,
    /// Raw function key data, when present and no navigation data precedes it
    pub function_key: Option<[u8; 4]>,
    /// Row
    pub row: u16,
    /// Column
    pub col: u16,
    /// Declared container count
    pub container_count: u16,
    /// Container ids actually present
    pub container_ids: Vec<u8>,
}

pub(super) fn decode_ui_event(value: Bytes, scope: &mut Scope) -> Result<ItemValue> {
    let mut reader = Reader::new(value);
    let valid = EventValid::from_u8(reader.read_u8("ui_event.valid")?);
    let event_type = reader.read_u16("ui_event.event_type")?;
    let control_type = reader.read_u16("ui_event.control_type")?;

    let mut navigation = None;
    let mut function_key = None;
    if valid.has(EventValid::NAVIGATION_DATA) {
        navigation = Some(reader.read_u8("ui_event.navigation")?);
    } else if valid.has(EventValid::FUNCTIONKEY_DATA) {
        function_key = Some(reader.read_fixed::<4>("ui_event.function_key")?);
    }

    let row = reader.read_u16("ui_event.row")?;
    let col = reader.read_u16("ui_event.col")?;
    let count_offset = reader.position();
    let container_count = reader.read_u16("ui_event.container_count")?;
    let (ids, clamped) = reader.read_clamped(usize::from(container_count));
    if clamped {
        scope.findings().push(
            DiagnosticKind::LengthMismatch,
            Layer::Diag,
            count_offset,
            format!("container count {container_count} exceeds the {} bytes available", ids.len()),
        );
    }

    Ok(ItemValue::UiEvent(UiEvent {
        valid,
        event_type,
        control_type,
        navigation,
        function_key,
        row,
        col,
        container_count,
        container_ids: ids.to_vec(),
    }))
}

/// Name of a control property id, if known.
#[must_use]
pub const fn property_name(id: u16) -> Option<&'static str> {
    Some(match id {
        1 => "TEXT",
        2 => "TOOLTIP",
        3 => "VISIBLE",
        4 => "ENABLED",
        5 => "FOCUS",
        6 => "NAME",
        7 => "TYPE",
        8 => "VALUE",
        9 => "CHANGED",
        10 => "ACCESSIBILITY_NAME",
        _ => return None,
    })
}

/// One control property.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ControlProperty {
    /// Property id
    pub id: u16,
    /// Property value
    pub value: String,
}

pub(super) fn decode_control_properties(value: Bytes, scope: &mut Scope) -> Result<ItemValue> {
    let mut reader = Reader::new(value);
    let mut properties = Vec::new();

    while !reader.is_empty() {
        let offset = reader.position();
        let Ok(id) = reader.read_u16("control.property_id") else {
            scope.findings().push(
                DiagnosticKind::InsufficientData,
                Layer::Diag,
                offset,
                "trailing byte after last control property",
            );
            reader.read_rest();
            break;
        };
        let value = match reader.read_cstring("control.value") {
            Ok(value) => value,
            Err(err) => {
                scope.findings().push_error(Layer::Diag, reader.position(), &err);
                reader.read_cstring_lenient()
            }
        };
        properties.push(ControlProperty { id, value });
    }

    Ok(ItemValue::ControlProperties(properties))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::{FrameId, Findings};

    fn run(decode: fn(Bytes, &mut Scope) -> Result<ItemValue>, raw: &[u8]) -> (ItemValue, Findings) {
        let mut findings = Findings::new();
        let mut scope = Scope::new(FrameId(1), &mut findings, 4);
        let value = decode(Bytes::copy_from_slice(raw), &mut scope).unwrap();
        (value, findings)
    }

    #[test]
    fn test_navigation_event() {
        let raw = [
            EventValid::NAVIGATION_DATA | EventValid::CONTROL_POS,
            0x00,
            0x0e,
            0x00,
            0x01,
            0x03,
            0x00,
            0x04,
            0x00,
            0x0a,
            0x00,
            0x02,
            0x07,
            0x08,
        ];
        let (value, findings) = run(decode_ui_event, &raw);
        let ItemValue::UiEvent(event) = value else {
            panic!("expected ui event");
        };
        assert!(findings.is_empty());
        assert_eq!(event_type_name(event.event_type), Some("NAVIGATION"));
        assert_eq!(event.navigation, Some(3));
        assert_eq!(event.function_key, None);
        assert_eq!((event.row, event.col), (4, 10));
        assert_eq!(event.container_ids, vec![7, 8]);
    }

    #[test]
    fn test_function_key_event_with_short_container_list() {
        let raw = [
            EventValid::FUNCTIONKEY_DATA,
            0x00,
            0x06,
            0x00,
            0x00,
            0x00,
            0x00,
            0x00,
            0x08,
            0x00,
            0x00,
            0x00,
            0x00,
            0x00,
            0x05,
            0x01,
        ];
        let (value, findings) = run(decode_ui_event, &raw);
        let ItemValue::UiEvent(event) = value else {
            panic!("expected ui event");
        };
        assert_eq!(event.function_key, Some([0, 0, 0, 8]));
        assert_eq!(event.container_count, 5);
        assert_eq!(event.container_ids, vec![1]);
        assert_eq!(findings.count(DiagnosticKind::LengthMismatch), 1);
    }

    #[test]
    fn test_control_properties() {
        let (value, findings) = run(decode_control_properties, b"\x00\x01Hello\0\x00\x03X\0\x00\x08tail");
        let ItemValue::ControlProperties(props) = value else {
            panic!("expected properties");
        };
        assert_eq!(props.len(), 3);
        assert_eq!(props[0], ControlProperty { id: 1, value: "Hello".into() });
        assert_eq!(property_name(props[1].id), Some("VISIBLE"));
        assert_eq!(props[2].value, "tail");
        assert_eq!(findings.count(DiagnosticKind::MalformedStructure), 1);
    }
}
