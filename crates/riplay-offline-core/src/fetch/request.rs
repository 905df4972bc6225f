use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::{Origin, Url};

use super::FetchError;
use crate::worker::ClientId;

/// An intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    /// Page that issued the request, if known
    pub client_id: Option<ClientId>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            client_id: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Parse a method name and absolute URL
    pub fn parse(method: &str, url: &str) -> Result<Self, FetchError> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| FetchError::InvalidUrl(format!("invalid method: {}", method)))?;
        let url = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self::new(method, url))
    }

    pub fn from_client(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Only retrieval requests are ever intercepted or cached.
    pub fn is_retrieval(&self) -> bool {
        self.method == Method::GET
    }

    /// Identity of this request inside a cache store: method plus URL,
    /// with any fragment dropped.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        format!("{} {}", self.method.as_str(), url)
    }
}

/// A fully buffered response.
///
/// The body is read to completion before a `Response` exists, so handing
/// out a copy is a plain `clone()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(with = "body_hex")]
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// True for 2xx statuses
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Retrieval policy for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Live fetch first, stored copy only when the network fails
    NetworkFirst,
    /// Stored copy first, live fetch only on a miss
    CacheFirst,
}

/// Pick the retrieval policy for `url` as seen from a page on `page_origin`.
///
/// Same-origin (scheme, host and port, default ports included) is served
/// network-first; everything else cache-first.
pub fn classify(url: &Url, page_origin: &Origin) -> Strategy {
    if url.origin() == *page_origin {
        Strategy::NetworkFirst
    } else {
        Strategy::CacheFirst
    }
}

mod body_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
