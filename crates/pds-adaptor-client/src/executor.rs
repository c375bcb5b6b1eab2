//! Single upstream call wrapped in the access token lifecycle.
//!
//! 1. Use the held token, minting one first if none is held.
//! 2. Send the request with `Authorization: Bearer <token>`.
//! 3. If the upstream answers 401, discard the held token, mint a new one
//!    and send once more.
//! 4. Classify anything that is still not a success.
//!
//! A second 401 is classified like any other failure. Token refresh is
//! bounded to one extra attempt per call.

use std::sync::Arc;

use pds_adaptor_auth::TokenSource;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::classifier::{FailureClassifier, RawFailure};
use crate::failure::UpstreamFailure;

/// An upstream request that can be sent more than once.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl UpstreamRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn patch(url: Url) -> Self {
        Self::new(Method::PATCH, url)
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

/// A fully read upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    /// Header value as a string, if present and visible ASCII.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Sends upstream requests with a bearer token, re-authenticating once on 401.
#[derive(Clone)]
pub struct AuthenticatingExecutor {
    http_client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    classifier: FailureClassifier,
}

impl AuthenticatingExecutor {
    pub fn new(http_client: reqwest::Client, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http_client,
            tokens,
            classifier: FailureClassifier::new(),
        }
    }

    pub fn classifier(&self) -> FailureClassifier {
        self.classifier
    }

    /// Sends `request`, returning the response only if it is a 2xx.
    ///
    /// `description` names the operation for logs and failure messages.
    pub async fn execute(
        &self,
        description: &str,
        request: &UpstreamRequest,
    ) -> Result<UpstreamResponse, UpstreamFailure> {
        let token = match self.tokens.current_token() {
            Some(token) => token,
            None => {
                tracing::debug!("No access token held, minting one");
                self.mint(description).await?
            }
        };

        let response = self.send(description, request, &token).await?;

        if self
            .classifier
            .triggers_reauthentication(response.status.as_u16())
        {
            tracing::info!(
                status = response.status.as_u16(),
                operation = description,
                "Access token rejected by PDS FHIR, re-authenticating"
            );
            self.tokens.discard_token();
            let token = self.mint(description).await?;
            let retried = self.send(description, request, &token).await?;
            return self.check_status(description, retried);
        }

        self.check_status(description, response)
    }

    async fn mint(&self, description: &str) -> Result<String, UpstreamFailure> {
        self.tokens
            .mint_new_token()
            .await
            .map_err(|e| self.classifier.classify(description, RawFailure::Token(e)))
    }

    async fn send(
        &self,
        description: &str,
        request: &UpstreamRequest,
        token: &str,
    ) -> Result<UpstreamResponse, UpstreamFailure> {
        self.try_send(request, token)
            .await
            .map_err(|e| self.classifier.classify(description, RawFailure::Transport(e)))
    }

    async fn try_send(
        &self,
        request: &UpstreamRequest,
        token: &str,
    ) -> Result<UpstreamResponse, reqwest::Error> {
        let mut builder = self
            .http_client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .bearer_auth(token);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }

    fn check_status(
        &self,
        description: &str,
        response: UpstreamResponse,
    ) -> Result<UpstreamResponse, UpstreamFailure> {
        if response.status.is_success() {
            return Ok(response);
        }
        Err(self.classifier.classify(
            description,
            RawFailure::Status {
                status: response.status.as_u16(),
                body: response.body,
            },
        ))
    }
}
