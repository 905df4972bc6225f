//! Scripted network used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{FetchError, Network, Request, Response};

/// Serves canned responses by URL. Unknown URLs and every URL while
/// offline fail like an unreachable host.
#[derive(Default)]
pub struct ScriptedNetwork {
    responses: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    log: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, response: Response) {
        self.responses.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn serve_text(&self, url: &str, body: &str) {
        self.serve(url, Response::new(200, body));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// `"<METHOD> <URL>"` for every fetch attempted, in order
    pub fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{} {}", request.method, request.url));

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unreachable(request.url.to_string()));
        }
        self.responses
            .lock()
            .unwrap()
            .get(request.url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::Unreachable(request.url.to_string()))
    }
}

/// Holds back the response for one URL until [`release`](Self::release)
/// is called. Every other URL is answered by the wrapped network at once.
pub struct GatedNetwork {
    inner: ScriptedNetwork,
    gated: String,
    entered: Notify,
    released: Notify,
}

impl GatedNetwork {
    pub fn new(inner: ScriptedNetwork, gated: &str) -> Self {
        Self {
            inner,
            gated: gated.to_string(),
            entered: Notify::new(),
            released: Notify::new(),
        }
    }

    /// Resolves once a fetch of the gated URL is waiting.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[async_trait]
impl Network for GatedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        if request.url.as_str() == self.gated {
            self.entered.notify_one();
            self.released.notified().await;
        }
        self.inner.fetch(request).await
    }
}
