//! Network access for intercepted requests.
//!
//! `HttpNetwork` performs real fetches through `reqwest`. Any HTTP status
//! is a successful fetch here; only transport failures are errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{FetchError, Request, Response};

/// Anything that can turn a request into a buffered response.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// HTTP network backed by reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    /// Create a network client. Without a timeout the underlying stack's
    /// defaults apply.
    pub fn new(timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                // Non-ASCII values are kept, lossily decoded
                let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
                (name.as_str().to_string(), value)
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(url = %request.url, status, bytes = body.len(), "Network fetch completed");

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
