//! Decoder error types

use thiserror::Error;

/// Fatal decoding errors.
///
/// These abort the message or sub-structure being decoded. Recoverable
/// conditions are reported as [`Diagnostic`](crate::Diagnostic)s instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Fewer bytes than a field requires
    #[error("insufficient data for {field}: need {needed} bytes, got {available}")]
    InsufficientData {
        /// Field being read
        field: &'static str,
        /// Bytes the field needs
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },

    /// NUL-terminated string ran into the end of the buffer
    #[error("unterminated string in {field} at offset {offset}")]
    UnterminatedString {
        /// Field being read
        field: &'static str,
        /// Offset where the string started
        offset: usize,
    },

    /// Structure without a safe resynchronization point
    #[error("malformed {structure}: {reason}")]
    Malformed {
        /// Structure name
        structure: &'static str,
        /// What went wrong
        reason: String,
    },

    /// Nested payload decoding went too deep
    #[error("nesting depth {depth} exceeds limit {limit}")]
    DepthExceeded {
        /// Depth reached
        depth: usize,
        /// Configured limit
        limit: usize,
    },
}

impl Error {
    /// Shorthand for [`Error::Malformed`].
    pub(crate) fn malformed(structure: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            structure,
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
