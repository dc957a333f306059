// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Size of the buffer kept for each kind of data.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 50_000;

/// Number of lines shipped per transport call.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

/// ∆ INCREMENT
pub const DELTA_PREFIX: char = '\u{2206}';

/// Δ GREEK CAPITAL LETTER DELTA
pub const DELTA_PREFIX_2: char = '\u{0394}';

/// Prefix reserved for internal metrics.
pub const TILDE_PREFIX: char = '~';

/// Tag appended to spans that carry span logs.
pub const SPAN_LOG_KEY: &str = "_spanLogs";

pub const REPORT_END_POINT: &str = "/report";

pub const EVENT_END_POINT: &str = "/api/v2/event";

pub const DEFAULT_SOURCE: &str = "unknown";

pub const DEFAULT_CSP_BASE_URL: &str = "https://console.cloud.vmware.com";

pub const CSP_API_TOKEN_AUTH_PATH: &str = "/csp/gateway/am/api/auth/api-tokens/authorize";

pub const CSP_CLIENT_CREDENTIALS_AUTH_PATH: &str = "/csp/gateway/am/api/auth/authorize";

pub const CSP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
