// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::TransportError;
use crate::transport::{join_lines, DataFormat, Transport};

/// Proxy listener ports. Spans and span logs share the tracing port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyPorts {
    pub metrics: Option<u16>,
    pub distribution: Option<u16>,
    pub tracing: Option<u16>,
    pub events: Option<u16>,
}

/// Lazily connected TCP stream to one proxy port.
#[derive(Debug)]
struct ProxyConnection {
    address: String,
    stream: Mutex<Option<TcpStream>>,
}

impl ProxyConnection {
    fn new(host: &str, port: u16) -> Self {
        ProxyConnection {
            address: format!("{host}:{port}"),
            stream: Mutex::new(None),
        }
    }

    async fn send(&self, payload: &[u8], timeout: Duration) -> Result<(), TransportError> {
        let mut stream = self.stream.lock().await;
        let result =
            tokio::time::timeout(timeout, write_payload(&mut stream, &self.address, payload)).await;
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                debug!("Dropping connection to proxy at {}: {}", self.address, e);
                *stream = None;
                Err(TransportError::Io(e))
            }
            Err(_) => {
                debug!("Dropping connection to proxy at {} after timeout", self.address);
                *stream = None;
                Err(TransportError::Timeout(timeout))
            }
        }
    }

    async fn close(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Error shutting down proxy connection {}: {}", self.address, e);
            }
        }
    }
}

async fn write_payload(
    slot: &mut Option<TcpStream>,
    address: &str,
    payload: &[u8],
) -> io::Result<()> {
    if slot.is_none() {
        debug!("Connecting to proxy at {}", address);
        *slot = Some(TcpStream::connect(address).await?);
    }
    let Some(stream) = slot.as_mut() else {
        return Err(io::Error::from(io::ErrorKind::NotConnected));
    };
    stream.write_all(payload).await?;
    stream.flush().await
}

/// Sends lines to a Wavefront proxy over plain TCP, one connection per listener port.
#[derive(Debug)]
pub struct ProxyTransport {
    metrics: Option<ProxyConnection>,
    distribution: Option<ProxyConnection>,
    tracing: Option<ProxyConnection>,
    events: Option<ProxyConnection>,
    timeout: Duration,
}

impl ProxyTransport {
    pub fn new(host: &str, ports: ProxyPorts, timeout: Duration) -> Self {
        let connect = |port: Option<u16>| port.map(|port| ProxyConnection::new(host, port));
        ProxyTransport {
            metrics: connect(ports.metrics),
            distribution: connect(ports.distribution),
            tracing: connect(ports.tracing),
            events: connect(ports.events),
            timeout,
        }
    }

    fn connection(&self, format: DataFormat) -> Option<&ProxyConnection> {
        match format {
            DataFormat::Wavefront => self.metrics.as_ref(),
            DataFormat::Histogram => self.distribution.as_ref(),
            DataFormat::Trace | DataFormat::SpanLogs => self.tracing.as_ref(),
            DataFormat::Event => self.events.as_ref(),
        }
    }
}

#[async_trait]
impl Transport for ProxyTransport {
    async fn send(&self, batch: &[String], format: DataFormat) -> Result<usize, TransportError> {
        let Some(connection) = self.connection(format) else {
            warn!("Can't send {} data to proxy: port not configured", format);
            return Err(TransportError::PortNotConfigured(format));
        };
        if batch.is_empty() {
            return Ok(0);
        }
        connection
            .send(join_lines(batch).as_bytes(), self.timeout)
            .await?;
        Ok(batch.len())
    }

    async fn close(&self) {
        for connection in [
            &self.metrics,
            &self.distribution,
            &self.tracing,
            &self.events,
        ]
        .into_iter()
        .flatten()
        {
            connection.close().await;
        }
    }
}
