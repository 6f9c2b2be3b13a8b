//! Diag support-bit capability set.
//!
//! The support bits are exchanged during Diag setup so client and server can
//! agree on optional features. Bit `n` lives in byte `n / 8` under mask
//! `1 << (n % 8)`.

use std::fmt;

use crate::error::{Error, Result};

/// Encoded size of a support-bit set.
pub const SUPPORT_BITS_LEN: usize = 27;

/// Number of named support bits.
pub const SUPPORT_BIT_COUNT: usize = SUPPORT_BITS_LEN * 8;

/// Support bit names indexed by bit number.
pub const SUPPORT_BIT_NAMES: [&str; SUPPORT_BIT_COUNT] = [
    // 0
    "PROGRESS_INDICATOR",
    "SAPGUI_LABELS",
    "SAPGUI_DIAGVERSION",
    "SAPGUI_SELECT_RECT",
    "SAPGUI_SYMBOL_RIGHT",
    "SAPGUI_FONT_METRIC",
    "SAPGUI_COMPR_ENHANCED",
    "SAPGUI_IMODE",
    // 8
    "SAPGUI_LONG_MESSAGE",
    "SAPGUI_TABLE",
    "SAPGUI_FOCUS_1",
    "SAPGUI_PUSHBUTTON_1",
    "UPPERCASE",
    "SAPGUI_TABPROPERTY",
    "INPUT_UPPERCASE",
    "RFC_DIALOG",
    // 16
    "LIST_HOTSPOT",
    "FKEY_TABLE",
    "MENU_SHORTCUT",
    "STOP_TRANS",
    "FULL_MENU",
    "OBJECT_NAMES",
    "CONTAINER_TYPE",
    "DLGH_FLAGS",
    // 24
    "APPL_MNU",
    "MESSAGE_INFO",
    "MESDUM_FLAG_ERR",
    "TABSEL_ATTRIB",
    "GUIAPI",
    "NOGRAPH",
    "NOMESSAGES",
    "NORABAX",
    // 32
    "NOSYSMSG",
    "NOSAPSCRIPT",
    "NORFC",
    "NEW_BSD_JUSTRIGHT",
    "MESSAGE_VARS",
    "OCX_SUPPORT",
    "SCROLL_INFOS",
    "TABLE_SIZE_OK",
    // 40
    "MESSAGE_INFO2",
    "VARINFO_OKCODE",
    "CURR_TCODE",
    "CONN_WSIZE",
    "PUSHBUTTON_2",
    "TABSTRIP",
    "UNKNOWN_1",
    "TABSCROLL_INFOS",
    // 48
    "TABLE_FIELD_NAMES",
    "NEW_MODE_REQUEST",
    "RFCBLOB_DIAG_PARSER",
    "MULTI_LOGIN_USER",
    "CONTROL_CONTAINER",
    "APPTOOLBAR_FIXED",
    "R3INFO_USER_CHECKED",
    "R3INFO_USERID",
    // 56
    "R3INFO_ROLLCOUNT",
    "USER_TURNTIME2",
    "NUM_FIELD",
    "WIN16",
    "CONTEXT_MENU",
    "SCROLLABLE_TABSTRIP_PAGE",
    "EVENT_DESCRIPTION",
    "LABEL_OWNER",
    // 64
    "CLICKABLE_FIELD",
    "PROPERTY_BAG",
    "UNUSED_1",
    "TABLE_ROW_REFERENCES_2",
    "PROPFONT_VALID",
    "VARINFO_CONTAINER",
    "R3INFO_IMODEUUID",
    "NOTGUI",
    // 72
    "WAN",
    "XML_BLOBS",
    "RFC_QUEUE",
    "RFC_COMPRESS",
    "JAVA_BEANS",
    "DPLOADONDEMAND",
    "CTL_PROPCACHE",
    "ENJOY_IMODEUUID",
    // 80
    "RFC_ASYNC_BLOB",
    "KEEP_SCROLLPOS",
    "UNUSED_2",
    "UNUSED_3",
    "XML_PROPERTIES",
    "UNUSED_4",
    "HEX_FIELD",
    "HAS_CACHE",
    // 88
    "XML_PROP_TABLE",
    "UNUSED_5",
    "ENJOY_IMODEUUID2",
    "ITS",
    "NO_EASYACCESS",
    "PROPERTYPUMP",
    "COOKIE",
    "UNUSED_6",
    // 96
    "SUPPBIT_AREA_SIZE",
    "DPLOADONDEMAND_WRITE",
    "CONTROL_FOCUS",
    "ENTRY_HISTORY",
    "AUTO_CODEPAGE",
    "CACHED_VSETS",
    "EMERGENCY_REPAIR",
    "AREA2FRONT",
    // 104
    "SCROLLBAR_WIDTH",
    "AUTORESIZE",
    "EDIT_VARLEN",
    "WORKPLACE",
    "PRINTDATA",
    "UNUSED_7",
    "SINGLE_SESSION",
    "NOTIFY_NEWMODE",
    // 112
    "TOOLBAR_HEIGHT",
    "XMLPROP_CONTAINER",
    "XMLPROP_DYNPRO",
    "DP_HTTP_PUT",
    "DYNAMIC_PASSPORT",
    "WEBGUI",
    "WEBGUI_HELPMODE",
    "CONTROLFOCUS_ON_LIST",
    // 120
    "CBU_RBUDUMMY_2",
    "EOKDUMMY_1",
    "GUI_USER_SCRIPTING",
    "SLC",
    "ACCESSIBILITY",
    "ECATT",
    "ENABLE_UTF8",
    "R3INFO_AUTOLOGOUT_TIME",
    // 128
    "VARINFO_ICON_TITLE_LIST",
    "ENABLE_UNICODE",
    "R3INFO_DBSID",
    "PROTOCOL_ITEMS",
    "WEBSAPCONSOLE",
    "R3INFO_KERNEL_VERSION",
    "VARINFO_CONTAINER_LOOP",
    "EOKDUMMY_2",
    // 136
    "MESSAGE_INFO3",
    "SBA2",
    "MAINAREA_SIZE",
    "GUIPATCHLEVEL_2",
    "DISPLAY_SIZE",
    "GUI_PACKET",
    "DIALOG_STEP_NUMBER",
    "TC_KEEP_SCROLL_POSITION",
    // 144
    "MESSAGE_SERVICE_REQUEST",
    "DYNT_NOFOCUS",
    "FRAME_TITLE",
    "R3INFO_CODEPAGE_APP",
    "CONTAINER_IMPLICIT_SIZE",
    "SPLITTER",
    "VARINFO_CONTAINER_CHANGED",
    "GUIAPP_IDENTIFICATION",
    // 152
    "ACCESSIBILITY_CUSTOMIZING",
    "SESSION_MANAGER",
    "R3INFO_IMODE_POOL",
    "WEBGUI_VALUE_REQUEST",
    "CTL_SERVICE_CALL",
    "BATCH_INPUT_RESULT",
    "NO_HTML_FOCUS",
    "DYNT_FOCUS_FRAME",
    // 160
    "LIST_FULLWIDTH",
    "ENABLE_APPL4",
    "CBURBU_NEW_STATE",
    "BINPUT_NUMERIC_FIELD",
    "STYLE_SHEET",
    "SCREEN_NUMBER",
    "MENU_ENTRY_ACCELERATOR",
    "TABSTRIP_ATOMS",
    // 168
    "UI_EVENT_SOURCE",
    "CONTROL_PROPERTIES",
    "IMODEUUIDS2",
    "CONTAINER_REMOVE",
    "WEBGUI_IE_MODE",
    "R3INFO_SESSION_TITLE",
    "VARINFO_SESSION_ICON",
    "SPLITTER_POSITION",
    // 176
    "UNUSED_8",
    "UNUSED_9",
    "UNUSED_10",
    "UNUSED_11",
    "UNUSED_12",
    "UNUSED_13",
    "UNUSED_14",
    "UNUSED_15",
    // 184
    "UNUSED_16",
    "UNUSED_17",
    "UNUSED_18",
    "UNUSED_19",
    "UNUSED_20",
    "UNUSED_21",
    "UNUSED_22",
    "UNUSED_23",
    // 192
    "UNUSED_24",
    "UNUSED_25",
    "UNUSED_26",
    "UNUSED_27",
    "UNUSED_28",
    "UNUSED_29",
    "UNUSED_30",
    "UNUSED_31",
    // 200
    "UNUSED_32",
    "UNUSED_33",
    "UNUSED_34",
    "UNUSED_35",
    "UNUSED_36",
    "UNUSED_37",
    "UNUSED_38",
    "UNUSED_39",
    // 208
    "UNUSED_40",
    "UNUSED_41",
    "UNUSED_42",
    "UNUSED_43",
    "UNUSED_44",
    "UNUSED_45",
    "UNUSED_46",
    "UNUSED_47",
];

/// Opaque 216-bit capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SupportBits([u8; SUPPORT_BITS_LEN]);

impl SupportBits {
    /// Wrap raw bytes.
    #[must_use]
    pub const fn from_array(bytes: [u8; SUPPORT_BITS_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode from a slice holding at least the full set.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let Some(raw) = bytes.get(..SUPPORT_BITS_LEN) else {
            return Err(Error::InsufficientData {
                field: "support_bits",
                needed: SUPPORT_BITS_LEN,
                available: bytes.len(),
            });
        };
        let mut out = [0u8; SUPPORT_BITS_LEN];
        out.copy_from_slice(raw);
        Ok(Self(out))
    }

    /// Build a set with the given bit numbers enabled.
    #[must_use]
    pub fn with_bits(bits: &[usize]) -> Self {
        let mut out = [0u8; SUPPORT_BITS_LEN];
        for &bit in bits.iter().filter(|&&bit| bit < SUPPORT_BIT_COUNT) {
            out[bit / 8] |= 1 << (bit % 8);
        }
        Self(out)
    }

    /// Raw encoded bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SUPPORT_BITS_LEN] {
        &self.0
    }

    /// Check a bit by number. Out-of-range bits are never set.
    #[must_use]
    pub fn is_set(&self, bit: usize) -> bool {
        bit < SUPPORT_BIT_COUNT && self.0[bit / 8] & (1 << (bit % 8)) != 0
    }

    /// Check a bit by name.
    #[must_use]
    pub fn is_set_by_name(&self, name: &str) -> bool {
        SUPPORT_BIT_NAMES
            .iter()
            .position(|&candidate| candidate == name)
            .is_some_and(|bit| self.is_set(bit))
    }

    /// Names of all enabled bits, in bit order.
    pub fn enabled(&self) -> impl Iterator<Item = &'static str> + '_ {
        (0..SUPPORT_BIT_COUNT)
            .filter(|&bit| self.is_set(bit))
            .map(|bit| SUPPORT_BIT_NAMES[bit])
    }

    /// Number of enabled bits.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.iter().map(|byte| byte.count_ones() as usize).sum()
    }
}

impl fmt::Display for SupportBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.enabled().collect();
        if names.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", names.join(" | "))
        }
    }
}
