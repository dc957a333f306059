// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Builds clients from endpoint URLs.
//!
//! - `proxy://<host>:<port>` and `http://<host>:<port>` reach a proxy's HTTP listener.
//! - `https://<token>@<host>` is direct ingestion with a static token.
//! - `https://<host>` with CSP options is direct ingestion with CSP-issued tokens.

use std::sync::Arc;

use tracing::info;
use url::Url;

use crate::auth::CspCredentials;
use crate::client::{WavefrontClient, WavefrontSender};
use crate::config::{Authorization, CspConfig, DirectConfig, SenderConfig};
use crate::constants::DEFAULT_CSP_BASE_URL;
use crate::errors::FactoryError;
use crate::multi::WavefrontMultiClient;

const DIRECT_DATA_INGESTION_SCHEME: &str = "https";
const HTTP_PROXY_SCHEME: &str = "http";
const PROXY_SCHEME: &str = "proxy";

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub sender: SenderConfig,
    pub https_proxy: Option<String>,
    pub csp_base_url: Option<String>,
    pub csp_api_token: Option<String>,
    pub csp_app_id: Option<String>,
    pub csp_app_secret: Option<String>,
    pub csp_org_id: Option<String>,
}

impl ClientOptions {
    fn csp_config(&self) -> Result<Option<CspConfig>, FactoryError> {
        let non_blank = |value: &Option<String>| value.clone().filter(|v| !v.trim().is_empty());
        let credentials = match (
            non_blank(&self.csp_app_id),
            non_blank(&self.csp_app_secret),
            non_blank(&self.csp_api_token),
        ) {
            (Some(app_id), Some(app_secret), _) => Some(CspCredentials::ClientCredentials {
                app_id,
                app_secret,
                org_id: non_blank(&self.csp_org_id),
            }),
            (Some(_), None, _) => return Err(FactoryError::MissingAppSecret),
            (None, _, Some(api_token)) => Some(CspCredentials::ApiToken(api_token)),
            (None, _, None) => None,
        };
        Ok(credentials.map(|credentials| CspConfig {
            base_url: non_blank(&self.csp_base_url)
                .unwrap_or_else(|| DEFAULT_CSP_BASE_URL.to_string()),
            credentials,
        }))
    }
}

/// Splits an endpoint URL into the server base URL and the token embedded in it, if any.
fn parse_endpoint(endpoint: &str) -> Result<(String, Option<String>), FactoryError> {
    let invalid = |reason: &str| FactoryError::InvalidUrl {
        url: endpoint.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(endpoint).map_err(|e| invalid(&e.to_string()))?;
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;

    match url.scheme() {
        DIRECT_DATA_INGESTION_SCHEME => {
            let server = match url.port() {
                Some(port) => format!("{DIRECT_DATA_INGESTION_SCHEME}://{host}:{port}"),
                None => format!("{DIRECT_DATA_INGESTION_SCHEME}://{host}"),
            };
            let token = Some(url.username())
                .filter(|user| !user.is_empty())
                .map(str::to_string);
            Ok((server, token))
        }
        PROXY_SCHEME | HTTP_PROXY_SCHEME => {
            let port = url
                .port_or_known_default()
                .ok_or_else(|| invalid("missing port"))?;
            Ok((format!("{HTTP_PROXY_SCHEME}://{host}:{port}"), None))
        }
        scheme => Err(FactoryError::UnknownScheme(scheme.to_string())),
    }
}

/// Keeps one client per server.
#[derive(Default)]
pub struct ClientFactory {
    clients: Vec<(String, Arc<WavefrontClient>)>,
}

impl ClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client for `endpoint`. Must be called within a tokio runtime.
    pub fn add_client(&mut self, endpoint: &str, options: ClientOptions) -> Result<(), FactoryError> {
        let (server, token) = parse_endpoint(endpoint)?;

        let authorization = match options.csp_config()? {
            Some(csp) => {
                info!(
                    "Using CSP {} for authentication with {}",
                    match csp.credentials {
                        CspCredentials::ApiToken(_) => "api token",
                        CspCredentials::ClientCredentials { .. } => "server to server app",
                    },
                    csp.base_url
                );
                Authorization::Csp(csp)
            }
            None => token.map_or(Authorization::None, Authorization::Token),
        };

        if self.existing_client(&server) {
            return Err(FactoryError::DuplicateClient(endpoint.to_string()));
        }

        let direct = DirectConfig {
            server: server.clone(),
            authorization,
            https_proxy: options.https_proxy,
        };
        let client = WavefrontClient::direct(&direct, &options.sender)?;
        self.clients.push((server, Arc::new(client)));
        Ok(())
    }

    fn existing_client(&self, server: &str) -> bool {
        self.clients.iter().any(|(existing, _)| existing == server)
    }

    pub fn servers(&self) -> impl Iterator<Item = &str> {
        self.clients.iter().map(|(server, _)| server.as_str())
    }

    /// No client, the only client, or a multi-client over all of them.
    pub fn get_client(&self) -> Option<Arc<dyn WavefrontSender>> {
        match self.clients.as_slice() {
            [] => None,
            [(_, client)] => Some(Arc::clone(client) as Arc<dyn WavefrontSender>),
            clients => {
                let multi = clients.iter().fold(WavefrontMultiClient::new(), |multi, (_, client)| {
                    multi.with_sender(Arc::clone(client) as Arc<dyn WavefrontSender>)
                });
                Some(Arc::new(multi))
            }
        }
    }
}
