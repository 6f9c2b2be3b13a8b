//! Diagnostics and the sensitive-data channel.
//!
//! Every decode call returns a [`Findings`] collector next to the decoded
//! structure. Recoverable problems land in `diagnostics`; anything that looks
//! like a credential lands in `credentials`, in addition to being part of the
//! normal decoded output.

use std::fmt;

use tracing::{trace, warn};

use crate::error::Error;

/// Identifier of a captured frame, supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Protocol layer that produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Layer {
    /// NI framing
    Ni,
    /// Router
    Router,
    /// SNC wrapper
    Snc,
    /// Diag header and items
    Diag,
    /// Dispatcher envelope
    Dp,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ni => "ni",
            Self::Router => "router",
            Self::Snc => "snc",
            Self::Diag => "diag",
            Self::Dp => "dp",
        };
        write!(f, "{name}")
    }
}

/// Diagnostic taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DiagnosticKind {
    /// Fewer bytes than a field requires
    InsufficientData,
    /// Declared and derivable lengths disagree
    LengthMismatch,
    /// No safe resync point inside a sub-structure
    MalformedStructure,
    /// Tag with no known decoder
    UnrecognizedTag,
}

/// A recoverable decoding problem.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Diagnostic {
    /// Category
    pub kind: DiagnosticKind,
    /// Layer that raised it
    pub layer: Layer,
    /// Offset within the layer's buffer
    pub offset: usize,
    /// Human-readable detail
    pub message: String,
}

/// Kind of credential surfaced on the sensitive channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CredentialKind {
    /// Password attached to a route hop
    RoutePassword,
    /// Password in a router admin info request
    AdminPassword,
    /// Screen field flagged invisible, usually a password input
    PasswordField,
}

/// Sensitive value found while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CredentialFinding {
    /// Frame the value was found in
    pub frame: FrameId,
    /// What kind of credential it is
    pub kind: CredentialKind,
    /// Where it belongs (hop host, field position, ...)
    pub context: String,
    /// The value itself
    pub value: String,
}

/// Per-decode collector of diagnostics and credentials.
#[derive(Debug, Clone, Default)]
pub struct Findings {
    diagnostics: Vec<Diagnostic>,
    credentials: Vec<CredentialFinding>,
}

impl Findings {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic.
    pub fn push(
        &mut self,
        kind: DiagnosticKind,
        layer: Layer,
        offset: usize,
        message: impl Into<String>,
    ) {
        let message = message.into();
        trace!(%layer, offset, ?kind, %message, "diagnostic");
        self.diagnostics.push(Diagnostic {
            kind,
            layer,
            offset,
            message,
        });
    }

    /// Record a fatal error as a diagnostic of the matching kind.
    pub fn push_error(&mut self, layer: Layer, offset: usize, err: &Error) {
        let kind = match err {
            Error::InsufficientData { .. } => DiagnosticKind::InsufficientData,
            Error::UnterminatedString { .. }
            | Error::Malformed { .. }
            | Error::DepthExceeded { .. } => DiagnosticKind::MalformedStructure,
        };
        self.push(kind, layer, offset, err.to_string());
    }

    /// Record a credential. The value itself is never logged.
    pub fn push_credential(
        &mut self,
        frame: FrameId,
        kind: CredentialKind,
        context: impl Into<String>,
        value: impl Into<String>,
    ) {
        let context = context.into();
        warn!(%frame, ?kind, %context, "credential found in cleartext");
        self.credentials.push(CredentialFinding {
            frame,
            kind,
            context,
            value: value.into(),
        });
    }

    /// Recorded diagnostics in decode order.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Recorded credentials in decode order.
    #[must_use]
    pub fn credentials(&self) -> &[CredentialFinding] {
        &self.credentials
    }

    /// Count diagnostics of a kind.
    #[must_use]
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty() && self.credentials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_maps_to_kind() {
        let mut findings = Findings::new();
        findings.push_error(
            Layer::Router,
            3,
            &Error::UnterminatedString {
                field: "host",
                offset: 3,
            },
        );
        findings.push_error(
            Layer::Diag,
            0,
            &Error::InsufficientData {
                field: "x",
                needed: 2,
                available: 1,
            },
        );
        assert_eq!(findings.count(DiagnosticKind::MalformedStructure), 1);
        assert_eq!(findings.count(DiagnosticKind::InsufficientData), 1);
        assert_eq!(findings.diagnostics()[0].layer, Layer::Router);
    }

    #[test]
    fn test_credentials_are_separate() {
        let mut findings = Findings::new();
        findings.push_credential(FrameId(7), CredentialKind::RoutePassword, "hostB", "secret");
        assert!(findings.diagnostics().is_empty());
        assert_eq!(findings.credentials().len(), 1);
        assert_eq!(findings.credentials()[0].frame, FrameId(7));
    }
}
