// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shipping of encoded batches to a proxy or a direct ingestion endpoint.

use async_trait::async_trait;
use derive_more::Display;

use crate::errors::TransportError;

pub mod http;
pub mod socket;

pub use http::HttpTransport;
pub use socket::ProxyTransport;

/// Kind of line carried by a batch, sent as the `f` query parameter over HTTP.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataFormat {
    #[display("wavefront")]
    Wavefront,
    #[display("histogram")]
    Histogram,
    #[display("trace")]
    Trace,
    #[display("spanLogs")]
    SpanLogs,
    #[display("event")]
    Event,
}

impl DataFormat {
    /// Flush order of the per-kind queues.
    pub const ALL: [DataFormat; 5] = [
        DataFormat::Wavefront,
        DataFormat::Histogram,
        DataFormat::Trace,
        DataFormat::SpanLogs,
        DataFormat::Event,
    ];

    /// Position of the kind in [`DataFormat::ALL`], used to index per-kind arrays.
    pub const fn index(self) -> usize {
        match self {
            DataFormat::Wavefront => 0,
            DataFormat::Histogram => 1,
            DataFormat::Trace => 2,
            DataFormat::SpanLogs => 3,
            DataFormat::Event => 4,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers every line of `batch`, returning how many were sent.
    ///
    /// A batch either goes out whole or fails whole; it is never retried here.
    async fn send(&self, batch: &[String], format: DataFormat) -> Result<usize, TransportError>;

    /// Largest batch of `format` this transport delivers in a single request, if any.
    fn max_batch_size(&self, _format: DataFormat) -> Option<usize> {
        None
    }

    /// Releases connections. Sends after `close` reconnect lazily where supported.
    async fn close(&self);
}

/// Concatenates lines into one payload, each newline-terminated.
pub(crate) fn join_lines(batch: &[String]) -> String {
    let mut payload = String::with_capacity(batch.iter().map(|l| l.len() + 1).sum());
    for line in batch {
        payload.push_str(line);
        if !line.ends_with('\n') {
            payload.push('\n');
        }
    }
    payload
}
