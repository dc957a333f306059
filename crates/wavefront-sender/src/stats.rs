// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery counters kept by each client.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::transport::DataFormat;

#[derive(Debug, Default)]
struct KindCounters {
    valid: AtomicU64,
    invalid: AtomicU64,
    dropped: AtomicU64,
    report_errors: AtomicU64,
}

impl KindCounters {
    fn snapshot(&self) -> KindStats {
        KindStats {
            valid: self.valid.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            report_errors: self.report_errors.load(Ordering::Relaxed),
        }
    }
}

/// Counters shared by a client and its flusher.
///
/// Every failure path goes through [`Counters::increment_failure`], so the failure count
/// is always the sum of invalid points, drops and failed requests.
#[derive(Debug, Default)]
pub struct Counters {
    failures: AtomicU64,
    kinds: [KindCounters; 5],
}

impl Counters {
    fn kind(&self, format: DataFormat) -> &KindCounters {
        &self.kinds[format.index()]
    }

    fn increment_failure(&self, n: u64) {
        self.failures.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_valid(&self, format: DataFormat) {
        self.kind(format).valid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid(&self, format: DataFormat) {
        self.kind(format).invalid.fetch_add(1, Ordering::Relaxed);
        self.increment_failure(1);
    }

    pub fn record_dropped(&self, format: DataFormat, n: u64) {
        if n == 0 {
            return;
        }
        self.kind(format).dropped.fetch_add(n, Ordering::Relaxed);
        self.increment_failure(n);
    }

    pub fn record_report_error(&self, format: DataFormat) {
        self.kind(format).report_errors.fetch_add(1, Ordering::Relaxed);
        self.increment_failure(1);
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> SenderStats {
        SenderStats {
            metrics: self.kind(DataFormat::Wavefront).snapshot(),
            histograms: self.kind(DataFormat::Histogram).snapshot(),
            spans: self.kind(DataFormat::Trace).snapshot(),
            span_logs: self.kind(DataFormat::SpanLogs).snapshot(),
            events: self.kind(DataFormat::Event).snapshot(),
            failures: self.failure_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindStats {
    /// Points accepted into the queue
    pub valid: u64,
    /// Points rejected by the encoder
    pub invalid: u64,
    /// Points lost to a full queue or a closed client
    pub dropped: u64,
    /// Failed transport requests
    pub report_errors: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub metrics: KindStats,
    pub histograms: KindStats,
    pub spans: KindStats,
    pub span_logs: KindStats,
    pub events: KindStats,
    pub failures: u64,
}

impl SenderStats {
    pub fn get(&self, format: DataFormat) -> KindStats {
        match format {
            DataFormat::Wavefront => self.metrics,
            DataFormat::Histogram => self.histograms,
            DataFormat::Trace => self.spans,
            DataFormat::SpanLogs => self.span_logs,
            DataFormat::Event => self.events,
        }
    }
}
