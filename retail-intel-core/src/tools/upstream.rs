//! HTTP access to the upstream data APIs

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

/// Maximum characters of an upstream error body kept in messages
const ERROR_BODY_LIMIT: usize = 300;

/// One JSON request/response round trip to an upstream API.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// `GET url` and parse the body as JSON
    async fn get_json(&self, url: &str) -> Result<Value>;

    /// `POST url` with a JSON body and bearer token, parse the reply as JSON
    async fn post_json(&self, url: &str, bearer: &str, body: &Value) -> Result<Value>;
}

/// reqwest-backed upstream with a fixed per-request timeout
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("retail-intel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn read_json(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(Error::Upstream(format!("HTTP {}: {}", status, snippet)));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self.client.get(url).send().await?;
        Self::read_json(response).await
    }

    async fn post_json(&self, url: &str, bearer: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .json(body)
            .send()
            .await?;
        Self::read_json(response).await
    }
}

/// Upstream serving fixed responses keyed by URL prefix.
///
/// Unmatched URLs fail with an upstream error. Every requested URL is
/// remembered so callers can check which endpoints were hit.
#[derive(Default)]
pub struct CannedUpstream {
    routes: Vec<(String, std::result::Result<Value, String>)>,
    requests: Mutex<Vec<String>>,
}

impl CannedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for any URL starting with `prefix`
    pub fn with_route(mut self, prefix: &str, body: Value) -> Self {
        self.routes.push((prefix.to_string(), Ok(body)));
        self
    }

    /// Fail any URL starting with `prefix`
    pub fn with_failure(mut self, prefix: &str, message: &str) -> Self {
        self.routes.push((prefix.to_string(), Err(message.to_string())));
        self
    }

    /// URLs requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn respond(&self, url: &str) -> Result<Value> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(url.to_string());

        // Longest matching prefix wins
        let route = self
            .routes
            .iter()
            .filter(|(prefix, _)| url.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len());

        match route {
            Some((_, Ok(body))) => Ok(body.clone()),
            Some((_, Err(message))) => Err(Error::Upstream(message.clone())),
            None => Err(Error::Upstream(format!("no route for {}", url))),
        }
    }
}

#[async_trait]
impl Upstream for CannedUpstream {
    async fn get_json(&self, url: &str) -> Result<Value> {
        self.respond(url)
    }

    async fn post_json(&self, url: &str, _bearer: &str, _body: &Value) -> Result<Value> {
        self.respond(url)
    }
}
