//! reqwest-based HTTP backend for the service under test.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use super::{HttpBackend, HttpMethod, HttpReply};
use crate::error::ProbeError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON HTTP client whose request paths are appended to `base_url`.
#[derive(Debug, Clone)]
pub struct ReqwestHttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestHttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl HttpBackend for ReqwestHttpBackend {
    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<HttpReply, ProbeError> {
        let url = format!("{}{}", self.base_url, path);
        let method = match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        };
        debug!(%method, %url, "service request");

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request.send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?.to_vec();
        Ok(HttpReply { status, body })
    }
}
