//! Hosting runtime for cache workers.
//!
//! The `Host` plays the part of the page's runtime: it runs the install
//! and activate lifecycle of each newly registered generation one at a
//! time, keeps the active generation authoritative, and routes every
//! request either through the active worker or straight to the network.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheError, CacheStorage};
use crate::fetch::{FetchError, Network, Request, Response};
use crate::worker::{
    CacheWorker, ClientId, ClientRegistry, ExtendableEvent, FetchEvent, GenerationState,
    Manifest, WorkerError,
};

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Failed to load {url}")]
    FailedLoad { url: String },

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Result of registering a cache generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub version: String,
    pub state: GenerationState,
    pub entries: usize,
    /// Stores removed during activation
    pub deleted: Vec<String>,
}

pub struct Host {
    base: Url,
    storage: Arc<CacheStorage>,
    network: Arc<dyn Network>,
    clients: ClientRegistry,
    /// Serializes install/activate across registrations
    lifecycle: Mutex<()>,
    active: RwLock<Option<CacheWorker>>,
}

impl Host {
    pub fn new(base: Url, storage: Arc<CacheStorage>, network: Arc<dyn Network>) -> Self {
        Self {
            base,
            storage,
            network,
            clients: ClientRegistry::new(),
            lifecycle: Mutex::new(()),
            active: RwLock::new(None),
        }
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    fn worker(
        &self,
        version: &str,
        manifest: Manifest,
        state: GenerationState,
    ) -> Result<CacheWorker, WorkerError> {
        CacheWorker::with_state(
            version,
            manifest,
            self.base.clone(),
            self.storage.clone(),
            self.network.clone(),
            self.clients.clone(),
            state,
        )
    }

    pub async fn active_version(&self) -> Option<String> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|w| w.version().to_string())
    }

    /// Install generation `version` from `manifest` and, once installed,
    /// activate it right away.
    ///
    /// If install fails the previously active generation keeps serving.
    pub async fn register(&self, version: &str, manifest: Manifest) -> Result<Registration, HostError> {
        let _guard = self.lifecycle.lock().await;

        let entries = manifest.len();
        let worker = self.worker(version, manifest, GenerationState::Installing)?;
        info!(version, entries, "Installing cache generation");

        let mut install = ExtendableEvent::install();
        worker.on_install(&mut install);
        if let Err(e) = install.settle().await {
            let active = self.active_version().await;
            warn!(version, error = %e, active = ?active, "Install failed, keeping current generation");
            return Err(e.into());
        }
        debug!(version, skip_waiting = worker.skip_waiting_requested(), "Install settled");

        let deleted = self.activate_worker(worker).await?;
        Ok(Registration {
            version: version.to_string(),
            state: GenerationState::Active,
            entries,
            deleted,
        })
    }

    async fn activate_worker(&self, worker: CacheWorker) -> Result<Vec<String>, HostError> {
        let mut activate = ExtendableEvent::activate();
        let deleted = worker.on_activate(&mut activate);
        if let Err(e) = activate.settle().await {
            let remaining = self.storage.keys().await.unwrap_or_default();
            let active = self.active_version().await;
            warn!(
                version = worker.version(),
                error = %e,
                active = ?active,
                remaining = ?remaining,
                "Activation failed, stores left on disk"
            );
            return Err(e.into());
        }
        let deleted = deleted.await.unwrap_or_default();

        let previous = self.active.write().await.replace(worker);
        if let Some(previous) = previous {
            previous.supersede().await?;
            debug!(version = previous.version(), "Previous generation superseded");
        }
        Ok(deleted)
    }

    /// Adopt an already populated generation as active without
    /// reinstalling it, as after a restart. Returns false if no store
    /// with that name exists.
    pub async fn resume(&self, version: &str, manifest: Manifest) -> Result<bool, HostError> {
        let _guard = self.lifecycle.lock().await;
        if !self.storage.has(version).await? {
            return Ok(false);
        }

        let worker = self.worker(version, manifest, GenerationState::Active)?;
        let previous = self.active.write().await.replace(worker);
        if let Some(previous) = previous {
            previous.supersede().await?;
        }
        debug!(version, "Resumed cache generation");
        Ok(true)
    }

    /// Open a page. It is controlled by the active generation, if any.
    pub async fn connect_client(&self) -> ClientId {
        let controller = self.active_version().await;
        self.clients.connect(controller).await
    }

    pub async fn controller_of(&self, client: ClientId) -> Option<String> {
        self.clients.controller(client).await
    }

    /// Load a resource the way a page would.
    ///
    /// With an active generation the request goes through its fetch
    /// handler. Requests it leaves alone, requests from pages no generation
    /// controls, and all requests when nothing is active go straight to the
    /// network.
    pub async fn fetch(&self, request: Request) -> Result<Response, HostError> {
        let worker = self.active.read().await.clone();
        let controlled = match request.client_id {
            Some(client) => self.clients.controller(client).await.is_some(),
            None => true,
        };

        if let (Some(worker), true) = (worker, controlled) {
            let url = request.url.to_string();
            let mut event = FetchEvent::new(request.clone());
            worker.on_fetch(&mut event);

            if let Some(response) = event.into_response() {
                return match response.await? {
                    Some(response) => Ok(response),
                    None => Err(HostError::FailedLoad { url }),
                };
            }
        }

        Ok(self.network.fetch(&request).await?)
    }
}

// ============================================================================
// Tests
// ============================================================================
