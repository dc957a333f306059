// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffered sender for Wavefront observability data.
//!
//! Points are encoded into the Wavefront line format when they are sent, buffered in
//! per-kind bounded queues and shipped in batches by a background flusher, either to a
//! Wavefront proxy (TCP sockets or HTTP) or to a direct ingestion endpoint (HTTPS with a
//! static or CSP-issued bearer token).

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod auth;
pub mod client;
pub mod config;
pub mod constants;
pub mod encoder;
pub mod entities;
pub mod errors;
pub mod factory;
pub mod flusher;
pub mod http;
pub mod multi;
pub mod queue;
pub mod stats;
pub mod transport;

pub use client::{WavefrontClient, WavefrontSender};
pub use entities::histogram::WavefrontHistogram;
pub use entities::DataPoint;
pub use multi::WavefrontMultiClient;
