//! Menu entries

use std::fmt;

use bytes::Bytes;

use super::item::ItemValue;
use crate::error::{Error, Result};
use crate::findings::{DiagnosticKind, Layer};
use crate::reader::{Reader, trim_text};
use crate::scope::Scope;

/// Size of the fixed menu entry prefix.
pub const MENU_PREFIX_LEN: usize = 20;

/// Menu entry flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MenuFlags(u8);

impl MenuFlags {
    /// Entry is a check box
    pub const CHECKBOX: u8 = 0x01;
    /// Entry is a separator bar
    pub const BAR: u8 = 0x02;
    /// Entry opens a submenu
    pub const MENU: u8 = 0x04;
    /// Entry is disabled
    pub const DISABLED: u8 = 0x08;

    const NAMES: [(u8, &'static str); 4] = [
        (Self::CHECKBOX, "CHECKBOX"),
        (Self::BAR, "BAR"),
        (Self::MENU, "MENU"),
        (Self::DISABLED, "DISABLED"),
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

impl fmt::Display for MenuFlags {
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

/// One menu entry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MenuEntry {
    /// Offset inside the item value
    pub offset: usize,
    /// Declared record length
    pub length: u16,
    /// Position in the menu tree, one byte per level
    pub position: [u8; 4],
    /// Entry flags
    pub flags: MenuFlags,
    /// Virtual key
    pub virtual_key: u8,
    /// Return code bytes
    pub return_code: [u8; 6],
    /// Function code
    pub function_code: String,
    /// Entry text
    pub text: String,
    /// Accelerator
    pub accelerator: String,
    /// Quick info
    pub info: String,
}

pub(super) fn decode_menu(value: Bytes, scope: &mut Scope) -> Result<ItemValue> {
    let mut reader = Reader::new(value);
    let mut entries = Vec::new();

    while !reader.is_empty() {
        let offset = reader.position();
        let length = reader.read_u16("menu.length")?;
        let len = usize::from(length);
        if len < MENU_PREFIX_LEN {
            return Err(Error::malformed(
                "menu entry",
                format!("record at {offset} declares {len} bytes, prefix needs {MENU_PREFIX_LEN}"),
            ));
        }
        let (body, clamped) = reader.read_clamped(len - 2);
        if clamped {
            scope.findings().push(
                DiagnosticKind::LengthMismatch,
                Layer::Diag,
                offset,
                format!("menu entry declares {len} bytes, {} available", body.len() + 2),
            );
        }
        let mut record = Reader::new(body);
        entries.push(MenuEntry {
            offset,
            length,
            position: record.read_fixed::<4>("menu.position")?,
            flags: MenuFlags::from_u8(record.read_u8("menu.flag")?),
            virtual_key: record.read_u8("menu.virtual_key")?,
            return_code: record.read_fixed::<6>("menu.return_code")?,
            function_code: trim_text(&record.read_bytes("menu.function_code", 6)?),
            text: record.read_cstring_lenient(),
            accelerator: record.read_cstring_lenient(),
            info: record.read_cstring_lenient(),
        });
    }

    Ok(ItemValue::Menu(entries))
}

/// Build one menu entry. Used by tests and benches.
#[must_use]
pub fn encode_menu_entry(position: [u8; 4], flags: u8, function_code: &str, text: &str, accelerator: &str, info: &str) -> Vec<u8> {
    let mut out = vec![0, 0];
    out.extend_from_slice(&position);
    out.push(flags);
    out.push(0);
    out.extend_from_slice(&[0; 6]);
    let mut fc = [b' '; 6];
    let len = function_code.len().min(6);
    fc[..len].copy_from_slice(&function_code.as_bytes()[..len]);
    out.extend_from_slice(&fc);
    for part in [text, accelerator, info] {
        out.extend_from_slice(part.as_bytes());
        out.push(0);
    }
    let total = (out.len() as u16).to_be_bytes();
    out[..2].copy_from_slice(&total);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::{FrameId, Findings};

    fn decode(raw: Vec<u8>) -> (Result<ItemValue>, Findings) {
        let mut findings = Findings::new();
        let mut scope = Scope::new(FrameId(1), &mut findings, 4);
        let value = decode_menu(Bytes::from(raw), &mut scope);
        (value, findings)
    }

    #[test]
    fn test_two_entries() {
        let mut raw = encode_menu_entry([1, 0, 0, 0], MenuFlags::MENU, "", "System", "", "");
        raw.extend(encode_menu_entry([1, 2, 0, 0], 0, "LOGOFF", "Log off", "Shift+F3", "End session"));
        let (value, findings) = decode(raw);
        let ItemValue::Menu(entries) = value.unwrap() else {
            panic!("expected menu");
        };

        assert!(findings.is_empty());
        assert_eq!(entries.len(), 2);
        assert!(entries[0].flags.has(MenuFlags::MENU));
        assert_eq!(entries[1].function_code, "LOGOFF");
        assert_eq!(entries[1].text, "Log off");
        assert_eq!(entries[1].accelerator, "Shift+F3");
        assert_eq!(entries[1].info, "End session");
    }

    #[test]
    fn test_short_record_length_is_malformed() {
        let mut raw = encode_menu_entry([1, 0, 0, 0], 0, "X", "x", "", "");
        raw[0] = 0;
        raw[1] = 10;
        let (value, _) = decode(raw);
        assert!(matches!(value, Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_overlong_last_entry_is_clamped() {
        let mut raw = encode_menu_entry([1, 0, 0, 0], 0, "BACK", "Back", "", "");
        raw[1] += 10;
        let (value, findings) = decode(raw);
        let ItemValue::Menu(entries) = value.unwrap() else {
            panic!("expected menu");
        };
        assert_eq!(entries[0].text, "Back");
        assert_eq!(findings.count(DiagnosticKind::LengthMismatch), 1);
    }
}
