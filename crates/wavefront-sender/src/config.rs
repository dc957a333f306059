// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::auth::CspCredentials;
use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_CSP_BASE_URL, DEFAULT_FLUSH_INTERVAL, DEFAULT_HTTP_TIMEOUT,
    DEFAULT_MAX_QUEUE_SIZE, DEFAULT_SOCKET_TIMEOUT, DEFAULT_SOURCE,
};
use crate::errors::ConfigError;
use crate::transport::socket::ProxyPorts;

/// Buffering and flushing settings shared by every client kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SenderConfig {
    /// Capacity of each per-kind queue
    pub max_queue_size: usize,
    /// Maximum number of lines per transport call
    pub batch_size: usize,
    /// Period of the background flush
    pub flush_interval: Duration,
    /// Source used for points that carry none. Falls back to the host name.
    pub default_source: Option<String>,
    /// Per-request timeout of HTTP transports
    pub timeout: Duration,
    /// Whether report payloads are gzipped
    pub compress: bool,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            default_source: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
            compress: true,
        }
    }
}

impl SenderConfig {
    /// Create configuration from `WAVEFRONT_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let parse = |key: &str| -> Result<Option<u64>, ConfigError> {
            lookup(key)
                .map(|val| {
                    val.trim().parse::<u64>().map_err(|_| {
                        ConfigError::Invalid(format!("{key} must be a non-negative integer, got '{val}'"))
                    })
                })
                .transpose()
        };

        let max_queue_size = parse("WAVEFRONT_MAX_QUEUE_SIZE")?
            .map_or(defaults.max_queue_size, |v| v as usize);
        let batch_size =
            parse("WAVEFRONT_BATCH_SIZE")?.map_or(defaults.batch_size, |v| v as usize);
        let flush_interval = parse("WAVEFRONT_FLUSH_INTERVAL_SECONDS")?
            .map_or(defaults.flush_interval, Duration::from_secs);
        let default_source = lookup("WAVEFRONT_SOURCE").filter(|val| !val.trim().is_empty());
        let timeout = parse("WAVEFRONT_HTTP_TIMEOUT_SECONDS")?
            .map_or(defaults.timeout, Duration::from_secs);
        let compress = lookup("WAVEFRONT_DISABLE_COMPRESSION")
            .map(|val| val.to_lowercase() != "true")
            .unwrap_or(true);

        let config = Self {
            max_queue_size,
            batch_size,
            flush_interval,
            default_source,
            timeout,
            compress,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::Invalid(
                "max_queue_size must be greater than 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "flush_interval must be greater than 0".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured source, else the host name, else `unknown`.
    pub fn resolve_default_source(&self) -> String {
        self.default_source
            .clone()
            .filter(|source| !source.trim().is_empty())
            .or_else(|| {
                hostname::get()
                    .ok()
                    .and_then(|name| name.into_string().ok())
                    .filter(|name| !name.is_empty())
            })
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string())
    }
}

/// A Wavefront proxy reached over raw TCP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    pub metrics_port: Option<u16>,
    pub distribution_port: Option<u16>,
    /// Shared by spans and span logs
    pub tracing_port: Option<u16>,
    pub event_port: Option<u16>,
    /// Bound on connecting and writing one batch
    pub timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            metrics_port: None,
            distribution_port: None,
            tracing_port: None,
            event_port: None,
            timeout: DEFAULT_SOCKET_TIMEOUT,
        }
    }
}

impl ProxyConfig {
    pub fn ports(&self) -> ProxyPorts {
        ProxyPorts {
            metrics: self.metrics_port,
            distribution: self.distribution_port,
            tracing: self.tracing_port,
            events: self.event_port,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("proxy host cannot be empty".to_string()));
        }
        let ports = [
            self.metrics_port,
            self.distribution_port,
            self.tracing_port,
            self.event_port,
        ];
        if ports.contains(&Some(0)) {
            return Err(ConfigError::Invalid(
                "proxy ports must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspConfig {
    pub base_url: String,
    pub credentials: CspCredentials,
}

impl CspConfig {
    pub fn new(credentials: CspCredentials) -> Self {
        Self {
            base_url: DEFAULT_CSP_BASE_URL.to_string(),
            credentials,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Authorization {
    /// HTTP proxy, no credentials.
    #[default]
    None,
    Token(String),
    Csp(CspConfig),
}

/// An HTTP endpoint: a proxy's HTTP listener or a direct ingestion cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectConfig {
    pub server: String,
    pub authorization: Authorization,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
}

impl DirectConfig {
    pub fn new(server: &str, authorization: Authorization) -> Self {
        Self {
            server: server.to_string(),
            authorization,
            https_proxy: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.trim().is_empty() {
            return Err(ConfigError::Invalid("server cannot be empty".to_string()));
        }
        if let Authorization::Token(token) = &self.authorization {
            if token.trim().is_empty() {
                return Err(ConfigError::Invalid("token cannot be empty".to_string()));
            }
        }
        Ok(())
    }
}
