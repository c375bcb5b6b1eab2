//! Basic Auth extractor for callers of the adaptor API.
//!
//! Every business endpoint requires `Authorization: Basic base64(name:key)`
//! where `name` identifies the calling service and `key` is its API key.
//! Keys are held as SHA-256 digests and compared by digest.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Caller name used when authentication is disabled.
pub const ANONYMOUS_CALLER: &str = "anonymous";

/// Registry of accepted API keys.
#[derive(Clone)]
pub struct ApiKeyAuthState {
    /// Caller name to hex encoded SHA-256 of its API key.
    key_digests: Arc<HashMap<String, String>>,
    enabled: bool,
}

impl ApiKeyAuthState {
    /// Creates a registry from plain-text `caller -> api key` pairs.
    pub fn new<I, K, V>(api_keys: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let key_digests = api_keys
            .into_iter()
            .map(|(name, key)| (name.into(), hash_api_key(key.as_ref())))
            .collect();
        Self {
            key_digests: Arc::new(key_digests),
            enabled: true,
        }
    }

    /// A registry that accepts every request as [`ANONYMOUS_CALLER`].
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            key_digests: Arc::new(HashMap::new()),
            enabled: false,
        }
    }

    /// Whether credentials are checked at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns `true` if `key` is the registered key for `caller`.
    #[must_use]
    pub fn verify(&self, caller: &str, key: &str) -> bool {
        self.key_digests
            .get(caller)
            .is_some_and(|expected| *expected == hash_api_key(key))
    }
}

/// An authenticated caller of the adaptor API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyCaller {
    /// Name the caller authenticated as.
    pub name: String,
}

/// Error returned when Basic Auth fails.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyAuthError {
    pub error: String,
    pub error_description: String,
}

impl ApiKeyAuthError {
    fn invalid_request(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_request".to_string(),
            error_description: description.into(),
        }
    }
}

impl IntoResponse for ApiKeyAuthError {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::UNAUTHORIZED, Json(self)).into_response();
        response.headers_mut().insert(
            axum::http::header::WWW_AUTHENTICATE,
            axum::http::HeaderValue::from_static("Basic realm=\"pds-adaptor\""),
        );
        response
    }
}

impl<S> FromRequestParts<S> for ApiKeyCaller
where
    S: Send + Sync,
    ApiKeyAuthState: FromRef<S>,
{
    type Rejection = ApiKeyAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = ApiKeyAuthState::from_ref(state);

        if !auth_state.is_enabled() {
            return Ok(ApiKeyCaller {
                name: ANONYMOUS_CALLER.to_string(),
            });
        }

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiKeyAuthError::invalid_request("Missing Authorization header"))?;

        let (name, key) = parse_basic_auth(auth_header).map_err(ApiKeyAuthError::invalid_request)?;

        if !auth_state.verify(&name, &key) {
            tracing::warn!(
                caller = %name,
                endpoint = %parts.uri.path(),
                "Rejected API key"
            );
            return Err(ApiKeyAuthError {
                error: "invalid_client".to_string(),
                error_description: "Invalid credentials".to_string(),
            });
        }

        tracing::debug!(
            caller = %name,
            endpoint = %parts.uri.path(),
            method = %parts.method,
            "Caller authenticated via Basic Auth"
        );

        Ok(ApiKeyCaller { name })
    }
}

/// Hex encoded SHA-256 digest of an API key.
#[must_use]
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Parse Basic Auth header.
///
/// Extracts credentials from "Basic <base64>" format.
fn parse_basic_auth(header: &str) -> Result<(String, String), String> {
    let credentials = header
        .strip_prefix("Basic ")
        .ok_or_else(|| "Authorization header must start with 'Basic '".to_string())?;

    let decoded = STANDARD
        .decode(credentials.trim())
        .map_err(|_| "Invalid base64 encoding in Authorization header".to_string())?;

    let credentials_str = String::from_utf8(decoded)
        .map_err(|_| "Invalid UTF-8 in decoded credentials".to_string())?;

    let (name, key) = credentials_str
        .split_once(':')
        .ok_or_else(|| "Credentials must be in format 'name:key'".to_string())?;

    Ok((name.to_string(), key.to_string()))
}
