// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Draining of the per-kind queues into the transport.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::errors::TransportError;
use crate::queue::BoundedQueue;
use crate::stats::Counters;
use crate::transport::{DataFormat, Transport};

pub struct FlusherConfig {
    pub transport: Arc<dyn Transport>,
    pub counters: Arc<Counters>,
    pub max_queue_size: usize,
    pub batch_size: usize,
}

/// Result of one pass over every queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Lines delivered
    pub sent: usize,
    /// Batches lost to a transport or auth error
    pub failed: u64,
    /// Batches put back because the endpoint is throttling
    pub throttled: u64,
}

impl FlushSummary {
    fn merge(&mut self, other: FlushSummary) {
        self.sent += other.sent;
        self.failed += other.failed;
        self.throttled += other.throttled;
    }
}

/// Result of [`Flusher::send_now`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendNowOutcome {
    /// Lines delivered
    pub sent: usize,
    /// Lines the endpoint refused with backpressure, in their original order
    pub throttled: Vec<String>,
}

pub struct Flusher {
    transport: Arc<dyn Transport>,
    counters: Arc<Counters>,
    queues: [BoundedQueue; 5],
    batch_size: usize,
    flush_lock: Mutex<()>,
}

impl Flusher {
    pub fn new(config: FlusherConfig) -> Self {
        Flusher {
            transport: config.transport,
            counters: config.counters,
            queues: std::array::from_fn(|_| BoundedQueue::new(config.max_queue_size)),
            batch_size: config.batch_size.max(1),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn queue(&self, format: DataFormat) -> &BoundedQueue {
        &self.queues[format.index()]
    }

    fn batch_size(&self, format: DataFormat) -> usize {
        match self.transport.max_batch_size(format) {
            Some(limit) => self.batch_size.min(limit.max(1)),
            None => self.batch_size,
        }
    }

    /// Ships everything queued when the flush starts. Concurrent flushes run one at a time.
    pub async fn flush(&self) -> FlushSummary {
        let _flush = self.flush_lock.lock().await;
        let mut summary = FlushSummary::default();
        for format in DataFormat::ALL {
            summary.merge(self.flush_queue(format).await);
        }
        if summary.sent > 0 {
            debug!("Flushed {} lines", summary.sent);
        }
        summary
    }

    async fn flush_queue(&self, format: DataFormat) -> FlushSummary {
        let queue = self.queue(format);
        let mut summary = FlushSummary::default();
        // Lines enqueued during the flush wait for the next one.
        let mut remaining = queue.len();
        let batch_size = self.batch_size(format);
        while remaining > 0 {
            let batch = queue.drain(batch_size.min(remaining));
            if batch.is_empty() {
                break;
            }
            remaining = remaining.saturating_sub(batch.len());

            match self.transport.send(&batch, format).await {
                Ok(sent) => summary.sent += sent,
                Err(TransportError::Backpressure) => {
                    let size = batch.len();
                    let dropped = queue.requeue_front(batch);
                    self.counters.record_dropped(format, dropped as u64);
                    warn!(
                        "Endpoint throttled a batch of {} {} lines, retrying on next flush ({} dropped)",
                        size, format, dropped
                    );
                    summary.throttled += 1;
                    break;
                }
                Err(e) => {
                    error!(
                        "Failed to send batch of {} {} lines: {}",
                        batch.len(),
                        format,
                        e
                    );
                    self.counters.record_report_error(format);
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// Sends pre-encoded lines right away, in chunks of the batch size.
    ///
    /// Throttled chunks are handed back in [`SendNowOutcome::throttled`] for the caller to
    /// queue or count.
    pub async fn send_now(&self, lines: &[String], format: DataFormat) -> SendNowOutcome {
        let mut outcome = SendNowOutcome::default();
        for chunk in lines.chunks(self.batch_size(format)) {
            match self.transport.send(chunk, format).await {
                Ok(n) => outcome.sent += n,
                Err(TransportError::Backpressure) => {
                    warn!("Endpoint throttled {} {} lines", chunk.len(), format);
                    outcome.throttled.extend_from_slice(chunk);
                }
                Err(e) => {
                    error!("Failed to send {} {} lines: {}", chunk.len(), format, e);
                    self.counters.record_report_error(format);
                }
            }
        }
        outcome
    }

    /// Empties every queue, counting the lines as dropped. Returns how many were discarded.
    pub fn discard_remaining(&self) -> usize {
        let mut discarded = 0;
        for format in DataFormat::ALL {
            let lines = self.queue(format).drain(usize::MAX);
            self.counters.record_dropped(format, lines.len() as u64);
            discarded += lines.len();
        }
        discarded
    }

    pub async fn close_transport(&self) {
        self.transport.close().await;
    }
}

/// Runs [`Flusher::flush`] every `interval` until `cancel_token` fires.
///
/// A flush already running when the token is cancelled completes before the task exits.
pub fn spawn_flush_task(
    flusher: Arc<Flusher>,
    interval: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut flush_interval = interval_at(Instant::now() + interval, interval);
        flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    debug!("Stopping background flush");
                    break;
                }
                _ = flush_interval.tick() => {
                    flusher.flush().await;
                }
            }
        }
    })
}
