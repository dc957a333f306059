// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The sender facade.
//!
//! `send_*` encode a point and enqueue the line without doing any I/O; a background task
//! ships the queues every flush interval. `send_*_now` bypass the queues and hand
//! pre-encoded lines to the transport right away.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::auth::{CspTokenManager, TokenFactory};
use crate::config::{Authorization, DirectConfig, ProxyConfig, SenderConfig};
use crate::encoder;
use crate::entities::{DataPoint, DeltaCounter, Distribution, Event, Metric, Span};
use crate::errors::{ConfigError, EncodingError, FactoryError, SenderError};
use crate::flusher::{spawn_flush_task, Flusher, FlusherConfig};
use crate::http::build_client;
use crate::stats::{Counters, SenderStats};
use crate::transport::{DataFormat, HttpTransport, ProxyTransport, Transport};

/// Capability shared by single clients and fan-out clients.
#[async_trait]
pub trait WavefrontSender: Send + Sync {
    fn send_metric(&self, metric: &Metric);

    fn send_delta_counter(&self, counter: &DeltaCounter);

    fn send_distribution(&self, distribution: &Distribution);

    /// Also queues the span's logs, when it has any.
    fn send_span(&self, span: &Span);

    fn send_event(&self, event: &Event);

    fn send(&self, point: &DataPoint) {
        match point {
            DataPoint::Metric(metric) => self.send_metric(metric),
            DataPoint::DeltaCounter(counter) => self.send_delta_counter(counter),
            DataPoint::Distribution(distribution) => self.send_distribution(distribution),
            DataPoint::Span(span) => self.send_span(span),
            DataPoint::Event(event) => self.send_event(event),
        }
    }

    async fn send_metric_now(&self, lines: &[String]) -> usize;

    async fn send_distribution_now(&self, lines: &[String]) -> usize;

    async fn send_span_now(&self, lines: &[String]) -> usize;

    async fn send_span_log_now(&self, lines: &[String]) -> usize;

    async fn send_event_now(&self, lines: &[String]) -> usize;

    /// Ships everything currently queued, returning the number of lines delivered.
    async fn flush_now(&self) -> usize;

    fn get_failure_count(&self) -> u64;

    /// Stops the background flush, ships what is left and releases the transport.
    async fn close(&self) -> Result<(), SenderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    Running,
    Closing,
    Closed,
}

impl ClientState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ClientState::Running,
            1 => ClientState::Closing,
            _ => ClientState::Closed,
        }
    }
}

/// Sends data to one destination through one transport.
pub struct WavefrontClient {
    flusher: Arc<Flusher>,
    counters: Arc<Counters>,
    default_source: String,
    json_events: bool,
    state: AtomicU8,
    /// Held shared while a point is checked and enqueued, exclusively while closing starts.
    intake: RwLock<()>,
    cancel_token: CancellationToken,
    flush_task: Mutex<Option<JoinHandle<()>>>,
    close_lock: tokio::sync::Mutex<()>,
}

impl WavefrontClient {
    /// Starts a client over an arbitrary transport. Must be called within a tokio runtime.
    ///
    /// `json_events` selects the events API body instead of the `@Event` line.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: &SenderConfig,
        json_events: bool,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let counters = Arc::new(Counters::default());
        let flusher = Arc::new(Flusher::new(FlusherConfig {
            transport,
            counters: Arc::clone(&counters),
            max_queue_size: config.max_queue_size,
            batch_size: config.batch_size,
        }));
        let cancel_token = CancellationToken::new();
        let flush_task = spawn_flush_task(
            Arc::clone(&flusher),
            config.flush_interval,
            cancel_token.clone(),
        );

        Ok(WavefrontClient {
            flusher,
            counters,
            default_source: config.resolve_default_source(),
            json_events,
            state: AtomicU8::new(ClientState::Running as u8),
            intake: RwLock::new(()),
            cancel_token,
            flush_task: Mutex::new(Some(flush_task)),
            close_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// A Wavefront proxy reached over TCP sockets.
    pub fn proxy(proxy: &ProxyConfig, config: &SenderConfig) -> Result<Self, ConfigError> {
        proxy.validate()?;
        debug!("Creating proxy client for {}", proxy.host);
        let transport = ProxyTransport::new(&proxy.host, proxy.ports(), proxy.timeout);
        Self::new(Arc::new(transport), config, false)
    }

    /// A proxy's HTTP listener or a direct ingestion endpoint.
    pub fn direct(direct: &DirectConfig, config: &SenderConfig) -> Result<Self, FactoryError> {
        direct.validate()?;
        let client = build_client(direct.https_proxy.as_deref(), config.timeout)
            .map_err(|e| FactoryError::HttpClient(e.to_string()))?;

        let token = match &direct.authorization {
            Authorization::None => None,
            Authorization::Token(token) => Some(TokenFactory::new_from_static_token(token)),
            Authorization::Csp(csp) => Some(TokenFactory::new_from_csp(CspTokenManager::new(
                client.clone(),
                &csp.base_url,
                csp.credentials.clone(),
            ))),
        };
        let json_events = token.is_some();
        debug!("Creating HTTP client for {}", direct.server);
        let transport = HttpTransport::new(
            client,
            &direct.server,
            token,
            config.compress,
            config.timeout,
        );
        Ok(Self::new(Arc::new(transport), config, json_events)?)
    }

    pub fn default_source(&self) -> &str {
        &self.default_source
    }

    pub fn stats(&self) -> SenderStats {
        self.counters.snapshot()
    }

    pub fn queue_size(&self, format: DataFormat) -> usize {
        self.flusher.queue(format).len()
    }

    fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ClientState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn enqueue(&self, format: DataFormat, encoded: Result<String, EncodingError>) {
        match encoded {
            Ok(line) => {
                self.enqueue_line(format, line);
            }
            Err(e) => {
                debug!("Dropping invalid {} point: {}", format, e);
                self.counters.record_invalid(format);
            }
        }
    }

    /// Returns whether the line was queued.
    fn enqueue_line(&self, format: DataFormat, line: String) -> bool {
        if self.flusher.queue(format).enqueue(line) {
            self.counters.record_valid(format);
            true
        } else {
            warn!("Buffer full, dropping {} point", format);
            self.counters.record_dropped(format, 1);
            false
        }
    }

    /// Admits one point while the client is running.
    ///
    /// The returned guard must be held until the point is enqueued, so `close` cannot
    /// start its final flush in between. Once closing has started the point is counted as
    /// dropped and `None` is returned.
    fn admit(&self, format: DataFormat) -> Option<RwLockReadGuard<'_, ()>> {
        #[allow(clippy::expect_used)]
        let intake = self.intake.read().expect("lock poisoned");
        if self.state() == ClientState::Running {
            return Some(intake);
        }
        warn!("Client is closed, dropping {} point", format);
        self.counters.record_dropped(format, 1);
        None
    }

    async fn send_now(&self, lines: &[String], format: DataFormat) -> usize {
        if self.state() == ClientState::Closed {
            return 0;
        }
        let outcome = self.flusher.send_now(lines, format).await;
        if !outcome.throttled.is_empty() {
            self.requeue_throttled(format, outcome.throttled);
        }
        outcome.sent
    }

    /// Queues lines the endpoint throttled so the next flush retries them.
    fn requeue_throttled(&self, format: DataFormat, lines: Vec<String>) {
        #[allow(clippy::expect_used)]
        let _intake = self.intake.read().expect("lock poisoned");
        if self.state() != ClientState::Running {
            warn!(
                "Client is closed, dropping {} throttled {} lines",
                lines.len(),
                format
            );
            self.counters.record_dropped(format, lines.len() as u64);
            return;
        }
        let mut queued = 0;
        for line in lines {
            if self.enqueue_line(format, line) {
                queued += 1;
            }
        }
        debug!("Queued {} throttled {} lines for the next flush", queued, format);
    }
}

impl Drop for WavefrontClient {
    fn drop(&mut self) {
        // Stops the background task of a client that was never closed.
        self.cancel_token.cancel();
    }
}

#[async_trait]
impl WavefrontSender for WavefrontClient {
    fn send_metric(&self, metric: &Metric) {
        let Some(_intake) = self.admit(DataFormat::Wavefront) else {
            return;
        };
        self.enqueue(
            DataFormat::Wavefront,
            encoder::metric_to_line_data(metric, &self.default_source),
        );
    }

    fn send_delta_counter(&self, counter: &DeltaCounter) {
        let Some(_intake) = self.admit(DataFormat::Wavefront) else {
            return;
        };
        self.enqueue(
            DataFormat::Wavefront,
            encoder::delta_counter_to_line_data(counter, &self.default_source),
        );
    }

    fn send_distribution(&self, distribution: &Distribution) {
        let Some(_intake) = self.admit(DataFormat::Histogram) else {
            return;
        };
        self.enqueue(
            DataFormat::Histogram,
            encoder::histogram_to_line_data(distribution, &self.default_source),
        );
    }

    fn send_span(&self, span: &Span) {
        let Some(_intake) = self.admit(DataFormat::Trace) else {
            return;
        };
        let line = match encoder::tracing_span_to_line_data(span, &self.default_source) {
            Ok(line) => line,
            Err(e) => {
                debug!("Dropping invalid trace point: {}", e);
                self.counters.record_invalid(DataFormat::Trace);
                return;
            }
        };
        let span_logs = (!span.span_logs.is_empty())
            .then(|| encoder::span_log_to_line_data(span, &line));
        // Logs of a span that did not fit in its queue are not shipped.
        if self.enqueue_line(DataFormat::Trace, line) {
            if let Some(encoded) = span_logs {
                self.enqueue(DataFormat::SpanLogs, encoded);
            }
        }
    }

    fn send_event(&self, event: &Event) {
        let Some(_intake) = self.admit(DataFormat::Event) else {
            return;
        };
        let encoded = if self.json_events {
            encoder::event_to_json(event, &self.default_source)
        } else {
            encoder::event_to_line_data(event, &self.default_source)
        };
        self.enqueue(DataFormat::Event, encoded);
    }

    async fn send_metric_now(&self, lines: &[String]) -> usize {
        self.send_now(lines, DataFormat::Wavefront).await
    }

    async fn send_distribution_now(&self, lines: &[String]) -> usize {
        self.send_now(lines, DataFormat::Histogram).await
    }

    async fn send_span_now(&self, lines: &[String]) -> usize {
        self.send_now(lines, DataFormat::Trace).await
    }

    async fn send_span_log_now(&self, lines: &[String]) -> usize {
        self.send_now(lines, DataFormat::SpanLogs).await
    }

    async fn send_event_now(&self, lines: &[String]) -> usize {
        self.send_now(lines, DataFormat::Event).await
    }

    async fn flush_now(&self) -> usize {
        if self.state() == ClientState::Closed {
            return 0;
        }
        self.flusher.flush().await.sent
    }

    fn get_failure_count(&self) -> u64 {
        self.counters.failure_count()
    }

    async fn close(&self) -> Result<(), SenderError> {
        let _close = self.close_lock.lock().await;
        if self.state() == ClientState::Closed {
            return Ok(());
        }
        {
            // Waits for points being enqueued, so every accepted line precedes the final flush.
            #[allow(clippy::expect_used)]
            let _intake = self.intake.write().expect("lock poisoned");
            self.set_state(ClientState::Closing);
        }
        self.cancel_token.cancel();

        let flush_task = {
            #[allow(clippy::expect_used)]
            let mut flush_task = self.flush_task.lock().expect("lock poisoned");
            flush_task.take()
        };
        let join_result = match flush_task {
            Some(handle) => handle.await,
            None => Ok(()),
        };

        let summary = self.flusher.flush().await;
        let discarded = self.flusher.discard_remaining();
        if discarded > 0 {
            warn!("Dropped {} lines left after the final flush", discarded);
        }
        self.flusher.close_transport().await;
        self.set_state(ClientState::Closed);

        if let Err(e) = join_result {
            error!("Background flush task failed: {}", e);
            return Err(SenderError::Join(e.to_string()));
        }
        let failed = summary.failed + summary.throttled;
        if failed > 0 {
            error!("Final flush failed for {} batches", failed);
            return Err(SenderError::FinalFlush(failed));
        }
        Ok(())
    }
}
