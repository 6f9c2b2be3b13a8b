//! Dynamic screen atoms
//!
//! A DYNT atom item is a sequence of self-delimiting records describing
//! screen elements. Records with a continuation element type (FNAME,
//! XMLPROP) attach to the preceding element; any other type opens a new
//! group.

use std::fmt;

use bytes::Bytes;
use tracing::trace;

use super::item::ItemValue;
use crate::error::{Error, Result};
use crate::findings::{CredentialKind, DiagnosticKind, Layer};
use crate::reader::{Reader, trim_text};
use crate::scope::Scope;

/// Size of the fixed atom prefix.
pub const ATOM_PREFIX_LEN: usize = 13;

/// Element type codes.
pub mod etype {
    /// Entry field
    pub const EFIELD_0: u8 = 0;
    /// Output field
    pub const OFIELD_0: u8 = 1;
    /// Keyword
    pub const KEYWORD_0: u8 = 2;
    /// Check button
    pub const CHECKBUTTON_0: u8 = 3;
    /// Radio button
    pub const RADIOBUTTON_0: u8 = 4;
    /// Push button
    pub const PUSHBUTTON_0: u8 = 5;
    /// Frame
    pub const FRAME_0: u8 = 6;
    /// Loop
    pub const LOOP_0: u8 = 7;
    /// Subscreen
    pub const SUBSCREEN: u8 = 8;
    /// Property
    pub const PROPERTY: u8 = 9;
    /// Extension 0
    pub const X_0: u8 = 10;
    /// Extension 1
    pub const X_1: u8 = 11;
    /// Flag
    pub const FLAG: u8 = 12;
    /// Field name, continues the previous element
    pub const FNAME: u8 = 114;
    /// Push button, second form
    pub const PUSHBUTTON_2: u8 = 115;
    /// Tab strip button
    pub const TABSTRIP_BUTTON: u8 = 116;
    /// Entry field, first extended form
    pub const EFIELD_1: u8 = 118;
    /// Output field, first extended form
    pub const OFIELD_1: u8 = 119;
    /// XML property, continues the previous element
    pub const XMLPROP: u8 = 120;
    /// Keyword, first extended form
    pub const KEYWORD_1: u8 = 121;
    /// Check button, first extended form
    pub const CHECKBUTTON_1: u8 = 122;
    /// Radio button, first extended form
    pub const RADIOBUTTON_1: u8 = 123;
    /// Frame, first extended form
    pub const FRAME_1: u8 = 124;
    /// Box
    pub const BOX: u8 = 125;
    /// Loop, first extended form
    pub const LOOP_1: u8 = 126;
    /// Entry field, second extended form
    pub const EFIELD_2: u8 = 127;
    /// Output field, second extended form
    pub const OFIELD_2: u8 = 128;
    /// Keyword, second extended form
    pub const KEYWORD_2: u8 = 129;
}

/// Name of an element type code, if known.
#[must_use]
pub const fn etype_name(code: u8) -> Option<&'static str> {
    use etype::*;
    Some(match code {
        EFIELD_0 => "EFIELD_0",
        OFIELD_0 => "OFIELD_0",
        KEYWORD_0 => "KEYWORD_0",
        CHECKBUTTON_0 => "CHECKBUTTON_0",
        RADIOBUTTON_0 => "RADIOBUTTON_0",
        PUSHBUTTON_0 => "PUSHBUTTON_0",
        FRAME_0 => "FRAME_0",
        LOOP_0 => "LOOP_0",
        SUBSCREEN => "SUBSCREEN",
        PROPERTY => "PROPERTY",
        X_0 => "X_0",
        X_1 => "X_1",
        FLAG => "FLAG",
        FNAME => "FNAME",
        PUSHBUTTON_2 => "PUSHBUTTON_2",
        TABSTRIP_BUTTON => "TABSTRIP_BUTTON",
        EFIELD_1 => "EFIELD_1",
        OFIELD_1 => "OFIELD_1",
        XMLPROP => "XMLPROP",
        KEYWORD_1 => "KEYWORD_1",
        CHECKBUTTON_1 => "CHECKBUTTON_1",
        RADIOBUTTON_1 => "RADIOBUTTON_1",
        FRAME_1 => "FRAME_1",
        BOX => "BOX",
        LOOP_1 => "LOOP_1",
        EFIELD_2 => "EFIELD_2",
        OFIELD_2 => "OFIELD_2",
        KEYWORD_2 => "KEYWORD_2",
        _ => return None,
    })
}

/// Whether records of this type extend the previous element.
#[must_use]
pub const fn is_continuation(code: u8) -> bool {
    matches!(code, etype::FNAME | etype::XMLPROP)
}

/// Atom attribute flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AtomAttr(u8);

impl AtomAttr {
    /// Combo box style
    pub const COMBOSTYLE: u8 = 0x01;
    /// 3D rendering
    pub const YES3D: u8 = 0x02;
    /// Proportional font
    pub const PROPFONT: u8 = 0x04;
    /// Value help available
    pub const MATCHCODE: u8 = 0x08;
    /// Right-justified
    pub const JUSTRIGHT: u8 = 0x10;
    /// Highlighted
    pub const INTENSIFY: u8 = 0x20;
    /// Input is not echoed
    pub const INVISIBLE: u8 = 0x40;
    /// Read-only
    pub const PROTECTED: u8 = 0x80;

    const NAMES: [(u8, &'static str); 8] = [
        (Self::COMBOSTYLE, "COMBOSTYLE"),
        (Self::YES3D, "YES3D"),
        (Self::PROPFONT, "PROPFONT"),
        (Self::MATCHCODE, "MATCHCODE"),
        (Self::JUSTRIGHT, "JUSTRIGHT"),
        (Self::INTENSIFY, "INTENSIFY"),
        (Self::INVISIBLE, "INVISIBLE"),
        (Self::PROTECTED, "PROTECTED"),
    ];

    /// Create from byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        Self(value)
    }

    /// Convert to byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Check whether a flag is set
    #[must_use]
    pub const fn has(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    /// Check if the field hides its input
    #[must_use]
    pub const fn is_invisible(self) -> bool {
        self.has(Self::INVISIBLE)
    }
}

impl fmt::Display for AtomAttr {
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

/// Element-specific part of an atom.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum AtomBody {
    /// Free text, with its display length when the element carries one
    Text {
        /// Display length
        dlen: Option<u8>,
        /// Text
        text: String,
    },
    /// Push button or tab strip button
    Button {
        /// Visible length
        v_len: u8,
        /// Visible height
        v_height: u8,
        /// Tab page id (tab strip buttons only)
        page_id: Option<u8>,
        /// Function code triggered by the button
        function_code: String,
        /// Button text
        text: String,
        /// Tab id (tab strip buttons only)
        id: Option<String>,
    },
    /// Extended entry/output field
    Field {
        /// Field flags
        flag: u16,
        /// Display length
        dlen: u16,
        /// Maximum length
        mlen: u16,
        /// Maximum characters
        max_chars: u16,
        /// Text
        text: String,
    },
    /// Element without a decoded body
    Raw(Bytes),
}

impl AtomBody {
    /// Text carried by the element, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } | Self::Button { text, .. } | Self::Field { text, .. } => Some(text),
            Self::Raw(_) => None,
        }
    }
}

/// One atom record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Atom {
    /// Offset inside the item value
    pub offset: usize,
    /// Record length, prefix included
    pub length: u16,
    /// First dialog flag
    pub dlg_flag1: u8,
    /// Second dialog flag
    pub dlg_flag2: u8,
    /// Element type code
    pub etype: u8,
    /// Screen area
    pub area: u8,
    /// Block
    pub block: u8,
    /// Group
    pub group: u8,
    /// Row
    pub row: u16,
    /// Column
    pub col: u16,
    /// Attribute flags
    pub attr: AtomAttr,
    /// Element body
    pub body: AtomBody,
}

impl Atom {
    /// Element type name, if known.
    #[must_use]
    pub const fn etype_name(&self) -> Option<&'static str> {
        etype_name(self.etype)
    }
}

/// A screen element and the continuation records attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AtomGroup {
    /// Leading element
    pub head: Atom,
    /// FNAME/XMLPROP records following the element
    pub continuations: Vec<Atom>,
}

pub(super) fn decode_atoms(value: Bytes, scope: &mut Scope) -> Result<ItemValue> {
    let mut reader = Reader::new(value);
    let mut groups: Vec<AtomGroup> = Vec::new();

    while !reader.is_empty() {
        let atom = decode_atom(&mut reader, scope)?;
        if is_continuation(atom.etype) {
            let Some(group) = groups.last_mut() else {
                return Err(Error::malformed(
                    "atom",
                    format!(
                        "group starts with continuation element {}",
                        etype_name(atom.etype).unwrap_or("?")
                    ),
                ));
            };
            group.continuations.push(atom);
        } else {
            groups.push(AtomGroup {
                head: atom,
                continuations: Vec::new(),
            });
        }
    }

    trace!(groups = groups.len(), "atom item");
    Ok(ItemValue::Atoms(groups))
}

fn decode_atom(reader: &mut Reader, scope: &mut Scope) -> Result<Atom> {
    let offset = reader.position();
    let length = reader.read_u16("atom.length")?;
    let len = usize::from(length);
    if len < ATOM_PREFIX_LEN || len - 2 > reader.remaining() {
        return Err(Error::malformed(
            "atom",
            format!(
                "record at {offset} declares {len} bytes, {} available",
                reader.remaining() + 2
            ),
        ));
    }
    let mut record = reader.sub_reader("atom.record", len - 2)?;

    let dlg_flag1 = record.read_u8("atom.dlg_flag1")?;
    let dlg_flag2 = record.read_u8("atom.dlg_flag2")?;
    let etype = record.read_u8("atom.etype")?;
    let area = record.read_u8("atom.area")?;
    let block = record.read_u8("atom.block")?;
    let group = record.read_u8("atom.group")?;
    let row = record.read_u16("atom.row")?;
    let col = record.read_u16("atom.col")?;
    let attr = AtomAttr::from_u8(record.read_u8("atom.attr")?);

    if etype_name(etype).is_none() {
        scope.findings().push(
            DiagnosticKind::UnrecognizedTag,
            Layer::Diag,
            offset,
            format!("unknown atom element type {etype}"),
        );
    }
    // A short body stays local to its atom; the record boundary is known.
    let mut raw_body = record.clone();
    let body = match decode_body(etype, &mut record) {
        Ok(body) => body,
        Err(err) => {
            scope.findings().push_error(Layer::Diag, offset, &err);
            AtomBody::Raw(raw_body.read_rest())
        }
    };

    if attr.is_invisible() {
        let frame = scope.frame();
        scope.findings().push_credential(
            frame,
            CredentialKind::PasswordField,
            format!("row {row} col {col}"),
            body.text().unwrap_or_default(),
        );
    }

    Ok(Atom {
        offset,
        length,
        dlg_flag1,
        dlg_flag2,
        etype,
        area,
        block,
        group,
        row,
        col,
        attr,
        body,
    })
}

fn decode_body(code: u8, record: &mut Reader) -> Result<AtomBody> {
    use etype::*;
    let body = match code {
        EFIELD_0 | OFIELD_0 | KEYWORD_0 | CHECKBUTTON_0 | RADIOBUTTON_0 | PUSHBUTTON_0 | FRAME_0 => {
            // A minimal record carries no display length.
            let dlen = if record.is_empty() {
                None
            } else {
                Some(record.read_u8("atom.dlen")?)
            };
            AtomBody::Text {
                dlen,
                text: trim_text(&record.read_rest()),
            }
        }
        FNAME | XMLPROP => AtomBody::Text {
            dlen: None,
            text: trim_text(&record.read_rest()),
        },
        PUSHBUTTON_2 | TABSTRIP_BUTTON => {
            let tabstrip = code == TABSTRIP_BUTTON;
            let v_len = record.read_u8("atom.v_len")?;
            let v_height = record.read_u8("atom.v_height")?;
            let page_id = if tabstrip {
                Some(record.read_u8("atom.page_id")?)
            } else {
                None
            };
            AtomBody::Button {
                v_len,
                v_height,
                page_id,
                function_code: record.read_cstring_lenient(),
                text: record.read_cstring_lenient(),
                id: tabstrip.then(|| record.read_cstring_lenient()),
            }
        }
        EFIELD_1 | OFIELD_1 | KEYWORD_1 | CHECKBUTTON_1 | RADIOBUTTON_1 | FRAME_1 => AtomBody::Field {
            flag: u16::from(record.read_u8("atom.flag1")?),
            dlen: u16::from(record.read_u8("atom.dlen1")?),
            mlen: u16::from(record.read_u8("atom.mlen1")?),
            max_chars: record.read_u16("atom.maxnrchars")?,
            text: trim_text(&record.read_rest()),
        },
        EFIELD_2 | OFIELD_2 | KEYWORD_2 => AtomBody::Field {
            flag: record.read_u16("atom.flag2")?,
            dlen: record.read_u16("atom.dlen2")?,
            mlen: record.read_u16("atom.mlen2")?,
            max_chars: record.read_u16("atom.maxnrchars")?,
            text: trim_text(&record.read_rest()),
        },
        _ => AtomBody::Raw(record.read_rest()),
    };
    Ok(body)
}

/// Build one atom record. Used by tests and benches.
#[must_use]
pub fn encode_atom(etype: u8, row: u16, col: u16, attr: u8, body: &[u8]) -> Vec<u8> {
    let len = (ATOM_PREFIX_LEN + body.len()) as u16;
    let mut out = Vec::with_capacity(usize::from(len));
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&[0, 0, etype, 0, 0, 0]);
    out.extend_from_slice(&row.to_be_bytes());
    out.extend_from_slice(&col.to_be_bytes());
    out.push(attr);
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::{FrameId, Findings};

    fn decode(raw: Vec<u8>) -> (Result<ItemValue>, Findings) {
        let mut findings = Findings::new();
        let mut scope = Scope::new(FrameId(3), &mut findings, 4);
        let value = decode_atoms(Bytes::from(raw), &mut scope);
        (value, findings)
    }

    fn groups(value: Result<ItemValue>) -> Vec<AtomGroup> {
        match value.unwrap() {
            ItemValue::Atoms(groups) => groups,
            other => panic!("expected atoms, got {other:?}"),
        }
    }

    #[test]
    fn test_continuations_attach_to_previous_group() {
        let mut raw = encode_atom(etype::EFIELD_0, 1, 2, 0, b"\x0cUser");
        raw.extend(encode_atom(etype::FNAME, 1, 2, 0, b"RSYST-BNAME"));
        raw.extend(encode_atom(etype::OFIELD_0, 2, 2, AtomAttr::PROTECTED, b"\x05Label"));
        let (value, findings) = decode(raw);
        let groups = groups(value);

        assert!(findings.is_empty());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].continuations.len(), 1);
        assert_eq!(groups[0].continuations[0].body.text(), Some("RSYST-BNAME"));
        assert_eq!(
            groups[0].head.body,
            AtomBody::Text {
                dlen: Some(12),
                text: "User".into()
            }
        );
        assert!(groups[1].head.attr.has(AtomAttr::PROTECTED));
    }

    #[test]
    fn test_headless_continuation_is_malformed() {
        let raw = encode_atom(etype::FNAME, 0, 0, 0, b"RSYST-BCODE");
        let (value, _) = decode(raw);
        assert!(matches!(value, Err(Error::Malformed { structure: "atom", .. })));
    }

    #[test]
    fn test_invisible_field_raises_credential() {
        let mut body = vec![0x01, 0x08, 0x28];
        body.extend_from_slice(&40u16.to_be_bytes());
        body.extend_from_slice(b"hunter2");
        let raw = encode_atom(etype::EFIELD_1, 5, 20, AtomAttr::INVISIBLE, &body);
        let (value, findings) = decode(raw);
        let groups = groups(value);

        assert_eq!(
            groups[0].head.body,
            AtomBody::Field {
                flag: 1,
                dlen: 8,
                mlen: 0x28,
                max_chars: 40,
                text: "hunter2".into()
            }
        );
        let creds = findings.credentials();
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].kind, CredentialKind::PasswordField);
        assert_eq!(creds[0].context, "row 5 col 20");
        assert_eq!(creds[0].value, "hunter2");
        assert_eq!(creds[0].frame, FrameId(3));
    }

    #[test]
    fn test_tabstrip_button() {
        let raw = encode_atom(etype::TABSTRIP_BUTTON, 0, 0, 0, b"\x0a\x01\x02=TAB1\0Overview\0TAB_ID\0");
        let (value, _) = decode(raw);
        assert_eq!(
            groups(value)[0].head.body,
            AtomBody::Button {
                v_len: 10,
                v_height: 1,
                page_id: Some(2),
                function_code: "=TAB1".into(),
                text: "Overview".into(),
                id: Some("TAB_ID".into()),
            }
        );
    }

    #[test]
    fn test_unknown_etype_opens_raw_group() {
        let raw = encode_atom(200, 0, 0, 0, &[1, 2, 3]);
        let (value, findings) = decode(raw);
        let groups = groups(value);
        assert_eq!(groups[0].head.body, AtomBody::Raw(Bytes::from_static(&[1, 2, 3])));
        assert_eq!(findings.count(DiagnosticKind::UnrecognizedTag), 1);
    }

    #[test]
    fn test_empty_field_keeps_siblings() {
        let mut raw = encode_atom(etype::OFIELD_0, 1, 1, 0, b"");
        raw.extend(encode_atom(etype::FNAME, 1, 1, 0, b"RSYST-MANDT"));
        raw.extend(encode_atom(etype::EFIELD_0, 1, 12, 0, b"\x03000"));
        let (value, findings) = decode(raw);
        let groups = groups(value);

        assert!(findings.is_empty());
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[0].head.body,
            AtomBody::Text {
                dlen: None,
                text: String::new()
            }
        );
        assert_eq!(groups[0].continuations[0].body.text(), Some("RSYST-MANDT"));
        assert_eq!(groups[1].head.body.text(), Some("000"));
    }

    #[test]
    fn test_short_button_body_stays_raw() {
        let mut raw = encode_atom(etype::PUSHBUTTON_2, 0, 0, 0, b"\x0a");
        raw.extend(encode_atom(etype::OFIELD_0, 2, 2, 0, b"\x04Next"));
        let (value, findings) = decode(raw);
        let groups = groups(value);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].head.body, AtomBody::Raw(Bytes::from_static(b"\x0a")));
        assert_eq!(groups[1].head.body.text(), Some("Next"));
        assert_eq!(findings.count(DiagnosticKind::InsufficientData), 1);
    }

    #[test]
    fn test_bad_record_length() {
        let mut raw = encode_atom(etype::OFIELD_0, 0, 0, 0, b"\x01x");
        raw[1] = 5;
        let (value, _) = decode(raw.clone());
        assert!(matches!(value, Err(Error::Malformed { .. })));

        raw[1] = 200;
        let (value, _) = decode(raw);
        assert!(matches!(value, Err(Error::Malformed { .. })));
    }
}
