//! sapwire - Decoder for the SAP NI protocol family
//!
//! This library decodes captured SAP GUI traffic: NI framing, SAP Router
//! route negotiation and administration, SNC frames and the Diag
//! application protocol with its dispatcher envelope and tagged items.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use sapwire::{Decoder, FrameInfo, Payload};
//!
//! let mut decoder = Decoder::default();
//! let frame = FrameInfo::new(
//!     1,
//!     "10.0.0.5:51000".parse().unwrap(),
//!     "10.0.0.9:3200".parse().unwrap(),
//! );
//!
//! let report = decoder.decode_segment(&frame, Bytes::from_static(b"\x00\x00\x00\x08NI_PING\x00"));
//! for payload in report.payloads() {
//!     if let Payload::Diag(message) = payload {
//!         println!("{} items", message.items().len());
//!     }
//! }
//! for credential in report.findings.credentials() {
//!     println!("{:?} in {}", credential.kind, credential.context);
//! }
//! ```
//!
//! # Layers
//!
//! - **NI** ([`ni`]) - length-prefixed PDUs and keepalives
//! - **Router** ([`router`]) - route requests, admin and control messages,
//!   per-connection session state
//! - **SNC** ([`snc`]) - secure network connection frames, structure only
//! - **Diag** ([`diag`]) - DP envelope, Diag header and item stream
//!
//! Problems found in the traffic are never returned as errors. They are
//! collected as [`Diagnostic`]s next to the decoded output, and cleartext
//! secrets are reported separately as [`CredentialFinding`]s.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod decoder;
pub mod diag;
pub mod error;
pub mod findings;
pub mod metrics;
pub mod ni;
pub mod reader;
pub mod router;
pub mod scope;
pub mod snc;

pub use decoder::{DecodedPdu, Decoder, DecoderConfig, FrameInfo, FrameReport};
pub use diag::{DiagBody, DiagItem, DiagMessage, ItemValue};
pub use error::{Error, Result};
pub use findings::{CredentialFinding, CredentialKind, Diagnostic, DiagnosticKind, FrameId, Findings, Layer};
pub use metrics::MetricsSnapshot;
pub use ni::{Keepalive, Payload, PortRegistry, Protocol};
pub use router::{RouteHop, RouteState, RoutedPayload, RouterMessage, SessionState};
pub use snc::SncFrame;

/// Default Diag port of instance 00.
pub const DEFAULT_DIAG_PORT: u16 = 3200;

/// Default SAP Router port.
pub const DEFAULT_ROUTER_PORT: u16 = 3299;
