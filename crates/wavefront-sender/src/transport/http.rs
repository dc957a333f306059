// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::auth::TokenFactory;
use crate::constants::{EVENT_END_POINT, REPORT_END_POINT};
use crate::errors::TransportError;
use crate::transport::{join_lines, DataFormat, Transport};

/// Posts batches to the `/report` endpoint of a Wavefront proxy or cluster.
///
/// With a token every request carries `Authorization: Bearer <token>` and events are
/// expected to be JSON bodies for the events API, one per request.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    server: String,
    token: Option<TokenFactory>,
    compress: bool,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        client: reqwest::Client,
        server: &str,
        token: Option<TokenFactory>,
        compress: bool,
        timeout: Duration,
    ) -> Self {
        HttpTransport {
            client,
            server: server.trim_end_matches('/').to_string(),
            token,
            compress,
            timeout,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    async fn post(
        &self,
        url: String,
        body: Vec<u8>,
        content_type: &'static str,
        compress: bool,
    ) -> Result<(), TransportError> {
        let mut request = self.client.post(&url).header(CONTENT_TYPE, content_type);
        let body = if compress {
            request = request.header(CONTENT_ENCODING, "gzip");
            gzip(&body)?
        } else {
            body
        };
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.get_token().await?);
        }

        let response = match request.body(body).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err(TransportError::Timeout(self.timeout)),
            Err(e) => return Err(TransportError::Request(e)),
        };
        let status = response.status();
        if status.is_success() {
            debug!("Posted payload to {}: {}", url, status);
            return Ok(());
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("{} is throttling requests", url);
            return Err(TransportError::Backpressure);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status { status, body })
    }
}

fn gzip(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(payload)
        .map_err(|e| TransportError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| TransportError::Compression(e.to_string()))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &[String], format: DataFormat) -> Result<usize, TransportError> {
        if batch.is_empty() {
            return Ok(0);
        }
        if format == DataFormat::Event && self.is_authenticated() {
            let url = format!("{}{}", self.server, EVENT_END_POINT);
            for event in batch {
                self.post(
                    url.clone(),
                    event.trim_end().as_bytes().to_vec(),
                    "application/json",
                    false,
                )
                .await?;
            }
            return Ok(batch.len());
        }

        let url = format!("{}{}?f={}", self.server, REPORT_END_POINT, format);
        self.post(
            url,
            join_lines(batch).into_bytes(),
            "application/octet-stream",
            self.compress,
        )
        .await?;
        Ok(batch.len())
    }

    /// Authenticated events are posted one per request, so a throttled event never takes
    /// already accepted ones back into the queue with it.
    fn max_batch_size(&self, format: DataFormat) -> Option<usize> {
        (format == DataFormat::Event && self.is_authenticated()).then_some(1)
    }

    async fn close(&self) {}
}
