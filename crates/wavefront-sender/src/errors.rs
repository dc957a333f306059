// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// A point is structurally incomplete and cannot be encoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("{0} name cannot be blank")]
    BlankName(&'static str),

    #[error("{0} tag key cannot be blank")]
    BlankTagKey(&'static str),

    #[error("{kind} tag value cannot be blank for key: {key}")]
    BlankTagValue { kind: &'static str, key: String },

    #[error("A distribution should have at least one centroid")]
    NoCentroids,

    #[error("Centroid count must be at least 1")]
    EmptyCentroid,

    #[error("Histogram granularities cannot be empty")]
    NoGranularities,

    #[error("Span {0} cannot be nil")]
    NilId(&'static str),

    #[error("Event start time cannot be blank")]
    MissingStartTime,

    #[error("Annotation key cannot be blank")]
    BlankAnnotationKey,

    #[error("Annotation value cannot be blank for key: {0}")]
    BlankAnnotationValue(String),

    #[error("Failed to serialize payload: {0}")]
    Json(String),
}

/// The CSP token service could not provide an access token.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("CSP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("CSP auth token refresh failed with status code {status}: {message}")]
    Status { status: StatusCode, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("No port configured for {0} data")]
    PortNotConfigured(crate::transport::DataFormat),

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Endpoint responded with {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Endpoint is throttling requests")]
    Backpressure,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Failed to compress payload: {0}")]
    Compression(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("Invalid endpoint URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unknown scheme specified while attempting to create a client: {0}")]
    UnknownScheme(String),

    #[error("Client with id {0} already exists")]
    DuplicateClient(String),

    #[error("Both 'csp_app_id' and 'csp_app_secret' are required")]
    MissingAppSecret,

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Outcome of closing a sender. Teardown always completes, these only report what the
/// final flush could not deliver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SenderError {
    #[error("Final flush failed for {0} batches")]
    FinalFlush(u64),

    #[error("Flusher task failed: {0}")]
    Join(String),
}
