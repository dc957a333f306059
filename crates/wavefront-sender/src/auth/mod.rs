// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;
use std::sync::Arc;

use crate::errors::AuthError;

pub mod csp;

pub use csp::{CspCredentials, CspTokenManager};

/// Source of the bearer token attached to direct ingestion requests.
#[derive(Clone)]
pub enum TokenFactory {
    Static(String),
    Csp(Arc<CspTokenManager>),
}

impl TokenFactory {
    pub fn new_from_static_token(token: &str) -> Self {
        Self::Static(token.to_string())
    }

    pub fn new_from_csp(manager: CspTokenManager) -> Self {
        Self::Csp(Arc::new(manager))
    }

    pub async fn get_token(&self) -> Result<String, AuthError> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::Csp(manager) => manager.get_token().await,
        }
    }
}

impl Debug for TokenFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(_) => write!(f, "TokenFactory::Static"),
            Self::Csp(_) => write!(f, "TokenFactory::Csp"),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[tokio::test]
    async fn new_from_static_token() {
        let factory = TokenFactory::new_from_static_token("mock-token");
        assert_eq!(factory.get_token().await.unwrap(), "mock-token");
    }

    #[test]
    fn debug_hides_token() {
        let factory = TokenFactory::new_from_static_token("secret-token");
        assert!(!format!("{factory:?}").contains("secret-token"));
    }
}
