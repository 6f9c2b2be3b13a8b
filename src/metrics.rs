//! Decode counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::findings::{DiagnosticKind, Findings};

const NANOSECONDS_PER_MICROSECOND: u128 = 1_000;

/// Counters owned by a [`Decoder`](crate::Decoder).
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    segments: AtomicU64,
    pdus: AtomicU64,
    keepalives: AtomicU64,
    router_messages: AtomicU64,
    diag_messages: AtomicU64,
    diag_items: AtomicU64,
    unrecognized_items: AtomicU64,
    diagnostics: AtomicU64,
    credentials: AtomicU64,
    need_more: AtomicU64,
    decode_latency_total_ns: AtomicU64,
    decode_latency_max_ns: AtomicU64,
}

/// Kind of decoded PDU payload for counting.
#[derive(Clone, Copy)]
pub(crate) enum PayloadKind {
    Keepalive,
    Router,
    Diag,
    Opaque,
}

impl Metrics {
    #[inline]
    pub(crate) fn record_pdu(&self, kind: PayloadKind) {
        self.pdus.fetch_add(1, Ordering::Relaxed);
        match kind {
            PayloadKind::Keepalive => {
                self.keepalives.fetch_add(1, Ordering::Relaxed);
            }
            PayloadKind::Router => {
                self.router_messages.fetch_add(1, Ordering::Relaxed);
            }
            PayloadKind::Diag => {
                self.diag_messages.fetch_add(1, Ordering::Relaxed);
            }
            PayloadKind::Opaque => {}
        }
    }

    #[inline]
    pub(crate) fn record_items(&self, count: usize) {
        self.diag_items.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_need_more(&self) {
        self.need_more.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_segment(&self, findings: &Findings, elapsed: Duration) {
        self.segments.fetch_add(1, Ordering::Relaxed);
        self.diagnostics
            .fetch_add(findings.diagnostics().len() as u64, Ordering::Relaxed);
        self.unrecognized_items.fetch_add(
            findings.count(DiagnosticKind::UnrecognizedTag) as u64,
            Ordering::Relaxed,
        );
        self.credentials
            .fetch_add(findings.credentials().len() as u64, Ordering::Relaxed);

        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.decode_latency_total_ns.fetch_add(nanos, Ordering::Relaxed);
        update_max(&self.decode_latency_max_ns, nanos);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            segments: self.segments.load(Ordering::Relaxed),
            pdus: self.pdus.load(Ordering::Relaxed),
            keepalives: self.keepalives.load(Ordering::Relaxed),
            router_messages: self.router_messages.load(Ordering::Relaxed),
            diag_messages: self.diag_messages.load(Ordering::Relaxed),
            diag_items: self.diag_items.load(Ordering::Relaxed),
            unrecognized_items: self.unrecognized_items.load(Ordering::Relaxed),
            diagnostics: self.diagnostics.load(Ordering::Relaxed),
            credentials: self.credentials.load(Ordering::Relaxed),
            need_more: self.need_more.load(Ordering::Relaxed),
            decode_latency_total_ns: self.decode_latency_total_ns.load(Ordering::Relaxed),
            decode_latency_max_ns: self.decode_latency_max_ns.load(Ordering::Relaxed),
        }
    }
}

fn update_max(target: &AtomicU64, candidate: u64) {
    let mut current = target.load(Ordering::Relaxed);
    while candidate > current {
        match target.compare_exchange_weak(current, candidate, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return,
            Err(old) => current = old,
        }
    }
}

/// Point-in-time copy of the decode counters.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MetricsSnapshot {
    /// Segments passed to the decoder
    pub segments: u64,
    /// Complete PDUs decoded
    pub pdus: u64,
    /// Keepalive PDUs
    pub keepalives: u64,
    /// Router messages
    pub router_messages: u64,
    /// Diag messages at NI level
    pub diag_messages: u64,
    /// Diag items, nested payloads included
    pub diag_items: u64,
    /// Items and tags without a decoder
    pub unrecognized_items: u64,
    /// Diagnostics of any kind
    pub diagnostics: u64,
    /// Credential findings
    pub credentials: u64,
    /// Segments that ended in a request for more bytes
    pub need_more: u64,
    /// Total time spent decoding
    pub decode_latency_total_ns: u64,
    /// Slowest segment
    pub decode_latency_max_ns: u64,
}

impl MetricsSnapshot {
    /// Average decode time per segment in microseconds.
    #[must_use]
    pub fn avg_decode_latency_us(&self) -> Option<u64> {
        if self.segments == 0 {
            return None;
        }
        let total = u128::from(self.decode_latency_total_ns);
        Some((total / (u128::from(self.segments) * NANOSECONDS_PER_MICROSECOND)) as u64)
    }
}
