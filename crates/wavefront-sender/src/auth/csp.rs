// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! OAuth access tokens issued by the VMware Cloud Services Platform (CSP).
//!
//! Tokens are fetched lazily on first use and cached until shortly before they expire.
//! Refreshes are serialized so that concurrent callers arriving after expiry share one
//! request to the token service.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::constants::{
    CSP_API_TOKEN_AUTH_PATH, CSP_CLIENT_CREDENTIALS_AUTH_PATH, CSP_REQUEST_TIMEOUT,
};
use crate::errors::AuthError;

const DIRECT_INGESTION_SCOPES: [&str; 4] =
    ["aoa:directDataIngestion", "aoa:*", "aoa/*", "ALL_PERMISSIONS"];

#[derive(Clone, PartialEq, Eq)]
pub enum CspCredentials {
    /// Organization-scoped API token exchanged for an access token.
    ApiToken(String),
    /// Server-to-server OAuth app.
    ClientCredentials {
        app_id: String,
        app_secret: String,
        org_id: Option<String>,
    },
}

impl CspCredentials {
    fn auth_path(&self) -> &'static str {
        match self {
            CspCredentials::ApiToken(_) => CSP_API_TOKEN_AUTH_PATH,
            CspCredentials::ClientCredentials { .. } => CSP_CLIENT_CREDENTIALS_AUTH_PATH,
        }
    }
}

impl std::fmt::Debug for CspCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CspCredentials::ApiToken(_) => write!(f, "CspCredentials::ApiToken"),
            CspCredentials::ClientCredentials { app_id, .. } => {
                write!(f, "CspCredentials::ClientCredentials({app_id})")
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub scope: String,
}

impl AuthorizeResponse {
    /// How long the token can be used, keeping a margin before the real expiry.
    pub fn time_offset(&self) -> Duration {
        let skew = if self.expires_in < 600 { 30 } else { 180 };
        Duration::from_secs(self.expires_in.saturating_sub(skew))
    }

    pub fn has_direct_ingestion_scope(&self) -> bool {
        self.scope.split_whitespace().any(|scope| {
            DIRECT_INGESTION_SCOPES
                .iter()
                .any(|valid| scope.ends_with(valid))
        })
    }
}

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct CspTokenManager {
    client: reqwest::Client,
    auth_url: String,
    credentials: CspCredentials,
    token: RwLock<Option<CachedToken>>,
    refresh_lock: Mutex<()>,
}

impl CspTokenManager {
    pub fn new(client: reqwest::Client, base_url: &str, credentials: CspCredentials) -> Self {
        let auth_url = format!(
            "{}{}",
            base_url.trim_end_matches('/'),
            credentials.auth_path()
        );
        CspTokenManager {
            client,
            auth_url,
            credentials,
            token: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Returns the cached access token, refreshing it first when it has expired.
    pub async fn get_token(&self) -> Result<String, AuthError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let _refresh = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        match self.request_token().await {
            Ok(response) => {
                if !response.has_direct_ingestion_scope() {
                    warn!(
                        "The CSP response did not find any scope matching 'aoa:directDataIngestion', 'aoa:*', 'aoa/*' or 'ALL_PERMISSIONS', which is required for Wavefront direct ingestion"
                    );
                }
                let expires_at = Instant::now() + response.time_offset();
                debug!(
                    "Fetched CSP access token, valid for {}s",
                    response.time_offset().as_secs()
                );
                let access_token = response.access_token;
                self.store(Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                }));
                Ok(access_token)
            }
            Err(e) => {
                error!("Failed to refresh CSP access token: {}", e);
                self.store(None);
                Err(e)
            }
        }
    }

    fn cached_token(&self) -> Option<String> {
        #[allow(clippy::expect_used)]
        let token = self.token.read().expect("lock poisoned");
        token
            .as_ref()
            .filter(|t| Instant::now() < t.expires_at)
            .map(|t| t.access_token.clone())
    }

    fn store(&self, token: Option<CachedToken>) {
        #[allow(clippy::expect_used)]
        let mut cached = self.token.write().expect("lock poisoned");
        *cached = token;
    }

    async fn request_token(&self) -> Result<AuthorizeResponse, AuthError> {
        let request = match &self.credentials {
            CspCredentials::ApiToken(api_token) => self
                .client
                .post(&self.auth_url)
                .form(&[("api_token", api_token.as_str())]),
            CspCredentials::ClientCredentials {
                app_id,
                app_secret,
                org_id,
            } => {
                let mut form = vec![("grant_type", "client_credentials")];
                if let Some(org_id) = org_id.as_deref().filter(|o| !o.is_empty()) {
                    form.push(("orgId", org_id));
                }
                self.client
                    .post(&self.auth_url)
                    .basic_auth(app_id, Some(app_secret))
                    .form(&form)
            }
        };

        let response = request.timeout(CSP_REQUEST_TIMEOUT).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::Status { status, message });
        }
        Ok(response.json::<AuthorizeResponse>().await?)
    }
}
