// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock transports for testing

use std::sync::Mutex;

use async_trait::async_trait;
use wavefront_sender::errors::TransportError;
use wavefront_sender::transport::{DataFormat, Transport};

/// Mock transport that records every batch it is given
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingTransport {
    batches: Mutex<Vec<(DataFormat, Vec<String>)>>,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn lines(&self, format: DataFormat) -> Vec<String> {
        self.batches
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|(f, _)| *f == format)
            .flat_map(|(_, batch)| batch.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, batch: &[String], format: DataFormat) -> Result<usize, TransportError> {
        self.batches
            .lock()
            .expect("lock poisoned")
            .push((format, batch.to_vec()));
        Ok(batch.len())
    }

    async fn close(&self) {}
}

/// Mock transport that rejects every batch
#[allow(dead_code)]
pub struct FailingTransport;

#[async_trait]
impl Transport for FailingTransport {
    async fn send(&self, _batch: &[String], _format: DataFormat) -> Result<usize, TransportError> {
        Err(TransportError::Io(std::io::Error::from(
            std::io::ErrorKind::ConnectionRefused,
        )))
    }

    async fn close(&self) {}
}
