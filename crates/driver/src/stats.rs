//! Per-stream transfer counters

use protocol::Classification;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of one stream's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Completions delivered to the stream
    pub completions: u64,
    /// Reports decoded and published
    pub reports: u64,
    /// Successful completions whose payload had the wrong size
    pub length_mismatches: u64,
    pub stalls: u64,
    pub timeouts: u64,
    /// Completions with an unexpected status
    pub errors: u64,
    /// Resubmissions that failed
    pub submit_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    completions: AtomicU64,
    reports: AtomicU64,
    length_mismatches: AtomicU64,
    stalls: AtomicU64,
    timeouts: AtomicU64,
    errors: AtomicU64,
    submit_failures: AtomicU64,
}

impl Counters {
    pub(crate) fn record_completion(&self, classification: Classification) {
        self.completions.fetch_add(1, Ordering::Relaxed);
        let counter = match classification {
            Classification::ProtocolStall => &self.stalls,
            Classification::TransientTimeout => &self.timeouts,
            Classification::Unexpected => &self.errors,
            Classification::Success | Classification::Terminated => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_report(&self) {
        self.reports.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_length_mismatch(&self) {
        self.length_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_submit_failure(&self) {
        self.submit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> TransferStats {
        TransferStats {
            completions: self.completions.load(Ordering::Relaxed),
            reports: self.reports.load(Ordering::Relaxed),
            length_mismatches: self.length_mismatches.load(Ordering::Relaxed),
            stalls: self.stalls.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            submit_failures: self.submit_failures.load(Ordering::Relaxed),
        }
    }
}
