//! In-memory access token store backed by the OAuth token endpoint.
//!
//! The store holds at most one bearer token. It starts empty, is filled by
//! [`AccessTokenStore::mint_new_token`], and every mint overwrites the
//! previous value. Tokens are never expired proactively: a stale token is
//! discovered when the upstream answers 401, at which point the caller
//! discards it and asks for a new mint. A failed mint leaves the store empty
//! so the rejected token is never sent again.
//!
//! Concurrent mints are not coordinated. Each mint obtains a usable token
//! and the store keeps whichever finished last.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::AuthResult;
use crate::error::AuthError;
use crate::signer::AssertionSigner;

/// `grant_type` sent to the token endpoint.
pub const GRANT_TYPE: &str = "client_credentials";

/// `client_assertion_type` for JWT bearer client authentication.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Source of bearer tokens for upstream requests.
///
/// The split between asking and forcing lets the caller decide whether an
/// empty token justifies a mint, or whether it already knows the held token
/// was rejected.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Returns the held token, never fetching one.
    fn current_token(&self) -> Option<String>;

    /// Obtains a brand new token, replacing any held value.
    async fn mint_new_token(&self) -> AuthResult<String>;

    /// Drops the held token after the upstream rejected it.
    fn discard_token(&self);
}

/// Configuration for the access token store.
#[derive(Debug, Clone)]
pub struct AccessTokenStoreConfig {
    /// Token endpoint URL.
    pub token_endpoint: Url,
    /// HTTP request timeout (default: 10 seconds).
    pub request_timeout: Duration,
}

impl AccessTokenStoreConfig {
    /// Creates a configuration for `token_endpoint` with default timeout.
    #[must_use]
    pub fn new(token_endpoint: Url) -> Self {
        Self {
            token_endpoint,
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Holds the current upstream bearer token and mints new ones on demand.
pub struct AccessTokenStore {
    http_client: reqwest::Client,
    signer: AssertionSigner,
    token: ArcSwapOption<String>,
    config: AccessTokenStoreConfig,
}

impl AccessTokenStore {
    /// Creates an empty store with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenRequest`] if the HTTP client cannot be built.
    pub fn new(config: AccessTokenStoreConfig, signer: AssertionSigner) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::token_transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(http_client, config, signer))
    }

    /// Creates an empty store sharing an existing HTTP client.
    #[must_use]
    pub fn with_client(
        http_client: reqwest::Client,
        config: AccessTokenStoreConfig,
        signer: AssertionSigner,
    ) -> Self {
        Self {
            http_client,
            signer,
            token: ArcSwapOption::empty(),
            config,
        }
    }

    /// Token endpoint this store mints against.
    #[must_use]
    pub fn token_endpoint(&self) -> &Url {
        &self.config.token_endpoint
    }

    async fn request_token(&self) -> AuthResult<String> {
        let assertion = self.signer.create_signed_assertion()?;
        let endpoint = &self.config.token_endpoint;

        tracing::debug!(endpoint = %endpoint, kid = %self.signer.key_id(), "Requesting access token");

        let response = self
            .http_client
            .post(endpoint.as_str())
            .form(&[
                ("grant_type", GRANT_TYPE),
                ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                ("client_assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::token_transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::token_request(
                status.as_u16(),
                format!("token endpoint returned {status}: {body}"),
            ));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::invalid_token_response(e.to_string()))?;

        parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::invalid_token_response("response has no access_token"))
    }
}

#[async_trait]
impl TokenSource for AccessTokenStore {
    fn current_token(&self) -> Option<String> {
        self.token.load_full().map(|t| t.as_ref().clone())
    }

    async fn mint_new_token(&self) -> AuthResult<String> {
        let token = self.request_token().await?;
        self.token.store(Some(Arc::new(token.clone())));
        tracing::info!("Minted new upstream access token");
        Ok(token)
    }

    fn discard_token(&self) {
        self.token.store(None);
    }
}
