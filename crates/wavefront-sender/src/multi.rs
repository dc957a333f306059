// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::client::WavefrontSender;
use crate::entities::{DeltaCounter, Distribution, Event, Metric, Span};
use crate::errors::SenderError;

/// Broadcasts every call to several senders, in the order they were added.
#[derive(Default)]
pub struct WavefrontMultiClient {
    senders: Vec<Arc<dyn WavefrontSender>>,
}

impl WavefrontMultiClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sender(mut self, sender: Arc<dyn WavefrontSender>) -> Self {
        self.senders.push(sender);
        self
    }

    pub fn add_sender(&mut self, sender: Arc<dyn WavefrontSender>) {
        self.senders.push(sender);
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

#[async_trait]
impl WavefrontSender for WavefrontMultiClient {
    fn send_metric(&self, metric: &Metric) {
        for sender in &self.senders {
            sender.send_metric(metric);
        }
    }

    fn send_delta_counter(&self, counter: &DeltaCounter) {
        for sender in &self.senders {
            sender.send_delta_counter(counter);
        }
    }

    fn send_distribution(&self, distribution: &Distribution) {
        for sender in &self.senders {
            sender.send_distribution(distribution);
        }
    }

    fn send_span(&self, span: &Span) {
        for sender in &self.senders {
            sender.send_span(span);
        }
    }

    fn send_event(&self, event: &Event) {
        for sender in &self.senders {
            sender.send_event(event);
        }
    }

    async fn send_metric_now(&self, lines: &[String]) -> usize {
        let mut sent = 0;
        for sender in &self.senders {
            sent += sender.send_metric_now(lines).await;
        }
        sent
    }

    async fn send_distribution_now(&self, lines: &[String]) -> usize {
        let mut sent = 0;
        for sender in &self.senders {
            sent += sender.send_distribution_now(lines).await;
        }
        sent
    }

    async fn send_span_now(&self, lines: &[String]) -> usize {
        let mut sent = 0;
        for sender in &self.senders {
            sent += sender.send_span_now(lines).await;
        }
        sent
    }

    async fn send_span_log_now(&self, lines: &[String]) -> usize {
        let mut sent = 0;
        for sender in &self.senders {
            sent += sender.send_span_log_now(lines).await;
        }
        sent
    }

    async fn send_event_now(&self, lines: &[String]) -> usize {
        let mut sent = 0;
        for sender in &self.senders {
            sent += sender.send_event_now(lines).await;
        }
        sent
    }

    async fn flush_now(&self) -> usize {
        let mut sent = 0;
        for sender in &self.senders {
            sent += sender.flush_now().await;
        }
        sent
    }

    fn get_failure_count(&self) -> u64 {
        self.senders.iter().map(|s| s.get_failure_count()).sum()
    }

    /// Closes every sender even when some fail, returning the first failure.
    async fn close(&self) -> Result<(), SenderError> {
        let mut first_error = None;
        for sender in &self.senders {
            if let Err(e) = sender.close().await {
                error!("Failed to close sender: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    /// Counts calls and reports a fixed failure count.
    #[derive(Default)]
    struct StubSender {
        failures: u64,
        close_error: Option<SenderError>,
        metrics: AtomicUsize,
        closed: AtomicU64,
    }

    #[async_trait]
    impl WavefrontSender for StubSender {
        fn send_metric(&self, _metric: &Metric) {
            self.metrics.fetch_add(1, Ordering::SeqCst);
        }
        fn send_delta_counter(&self, _counter: &DeltaCounter) {}
        fn send_distribution(&self, _distribution: &Distribution) {}
        fn send_span(&self, _span: &Span) {}
        fn send_event(&self, _event: &Event) {}
        async fn send_metric_now(&self, lines: &[String]) -> usize {
            lines.len()
        }
        async fn send_distribution_now(&self, lines: &[String]) -> usize {
            lines.len()
        }
        async fn send_span_now(&self, lines: &[String]) -> usize {
            lines.len()
        }
        async fn send_span_log_now(&self, lines: &[String]) -> usize {
            lines.len()
        }
        async fn send_event_now(&self, _lines: &[String]) -> usize {
            0
        }
        async fn flush_now(&self) -> usize {
            1
        }
        fn get_failure_count(&self) -> u64 {
            self.failures
        }
        async fn close(&self) -> Result<(), SenderError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            match &self.close_error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
    }

    fn stub(failures: u64, close_error: Option<SenderError>) -> Arc<StubSender> {
        Arc::new(StubSender {
            failures,
            close_error,
            ..Default::default()
        })
    }

    #[test]
    fn test_failure_count_is_summed() {
        let multi = WavefrontMultiClient::new()
            .with_sender(stub(3, None))
            .with_sender(stub(5, None));
        assert_eq!(multi.get_failure_count(), 8);
    }

    #[tokio::test]
    async fn test_calls_are_broadcast() {
        let first = stub(0, None);
        let second = stub(0, None);
        let multi = WavefrontMultiClient::new()
            .with_sender(first.clone())
            .with_sender(second.clone());

        multi.send_metric(&Metric::default());
        assert_eq!(first.metrics.load(Ordering::SeqCst), 1);
        assert_eq!(second.metrics.load(Ordering::SeqCst), 1);

        let lines = vec!["a\n".to_string(), "b\n".to_string()];
        assert_eq!(multi.send_metric_now(&lines).await, 4);
        assert_eq!(multi.flush_now().await, 2);
    }

    #[tokio::test]
    async fn test_close_continues_past_failures() {
        let first = stub(0, Some(SenderError::FinalFlush(1)));
        let second = stub(0, Some(SenderError::FinalFlush(2)));
        let third = stub(0, None);
        let multi = WavefrontMultiClient::new()
            .with_sender(first.clone())
            .with_sender(second.clone())
            .with_sender(third.clone());

        assert_eq!(multi.close().await, Err(SenderError::FinalFlush(1)));
        for sender in [first, second, third] {
            assert_eq!(sender.closed.load(Ordering::SeqCst), 1);
        }
    }
}
