//! Cache worker for a single cache generation.
//!
//! The worker owns one version string and answers every lifecycle and
//! fetch event against the store of that name only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};
use url::{Origin, Url};

use super::{
    ClientRegistry, ExtendableEvent, FetchEvent, GenerationState, Manifest, WorkerError,
};
use crate::cache::CacheStorage;
use crate::fetch::{classify, FetchError, Network, Request, Response, Strategy};

struct Inner {
    version: String,
    manifest: Manifest,
    base: Url,
    origin: Origin,
    storage: Arc<CacheStorage>,
    network: Arc<dyn Network>,
    clients: ClientRegistry,
    state: Mutex<GenerationState>,
    skip_waiting: AtomicBool,
}

/// Cache manager for one generation.
/// Clone is cheap - all state is shared behind an Arc.
#[derive(Clone)]
pub struct CacheWorker {
    inner: Arc<Inner>,
}

impl CacheWorker {
    /// Create a worker for generation `version`, starting in `Installing`.
    ///
    /// `base` is the page URL; its origin decides which requests are
    /// same-origin and root-relative manifest entries resolve against it.
    pub fn new(
        version: &str,
        manifest: Manifest,
        base: Url,
        storage: Arc<CacheStorage>,
        network: Arc<dyn Network>,
        clients: ClientRegistry,
    ) -> Result<Self, WorkerError> {
        Self::with_state(
            version,
            manifest,
            base,
            storage,
            network,
            clients,
            GenerationState::Installing,
        )
    }

    pub(crate) fn with_state(
        version: &str,
        manifest: Manifest,
        base: Url,
        storage: Arc<CacheStorage>,
        network: Arc<dyn Network>,
        clients: ClientRegistry,
        state: GenerationState,
    ) -> Result<Self, WorkerError> {
        CacheStorage::validate_name(version)?;
        let origin = base.origin();
        Ok(Self {
            inner: Arc::new(Inner {
                version: version.to_string(),
                manifest,
                base,
                origin,
                storage,
                network,
                clients,
                state: Mutex::new(state),
                skip_waiting: AtomicBool::new(false),
            }),
        })
    }

    pub fn version(&self) -> &str {
        &self.inner.version
    }

    pub fn manifest(&self) -> &Manifest {
        &self.inner.manifest
    }

    pub async fn state(&self) -> GenerationState {
        *self.inner.state.lock().await
    }

    /// Whether install asked to take over without waiting for older
    /// generations' pages to close.
    pub fn skip_waiting_requested(&self) -> bool {
        self.inner.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn strategy_for(&self, request: &Request) -> Strategy {
        classify(&request.url, &self.inner.origin)
    }

    async fn transition(&self, to: GenerationState) -> Result<(), WorkerError> {
        let mut state = self.inner.state.lock().await;
        if !state.can_transition_to(to) {
            return Err(WorkerError::InvalidStateTransition { from: *state, to });
        }
        let from = *state;
        debug!(version = %self.inner.version, from = %from, to = %to, "Generation state change");
        *state = to;
        Ok(())
    }

    pub(crate) async fn supersede(&self) -> Result<(), WorkerError> {
        self.transition(GenerationState::Superseded).await
    }

    // ===== Install =====

    pub fn on_install(&self, event: &mut ExtendableEvent) {
        let worker = self.clone();
        event.wait_until(async move { worker.install().await.map(|_| ()) });
    }

    /// Populate this generation's store from the manifest.
    ///
    /// Every entry is fetched before anything is written; one failed or
    /// non-2xx fetch fails the whole install and leaves no new store behind.
    /// Returns the number of stored entries.
    pub async fn install(&self) -> Result<usize, WorkerError> {
        let state = self.state().await;
        if state != GenerationState::Installing {
            return Err(WorkerError::InvalidStateTransition {
                from: state,
                to: GenerationState::Installed,
            });
        }

        match self.populate().await {
            Ok(count) => {
                self.transition(GenerationState::Installed).await?;
                self.inner.skip_waiting.store(true, Ordering::SeqCst);
                info!(version = %self.inner.version, entries = count, "Cache generation installed");
                Ok(count)
            }
            Err(e) => {
                warn!(version = %self.inner.version, error = %e, "Cache generation install failed");
                self.transition(GenerationState::Discarded).await?;
                Err(e)
            }
        }
    }

    async fn populate(&self) -> Result<usize, WorkerError> {
        let requests: Vec<Request> = self
            .inner
            .manifest
            .resolve(&self.inner.base)?
            .into_iter()
            .map(Request::get)
            .collect();

        let network = &self.inner.network;
        let responses = try_join_all(requests.iter().map(|request| async move {
            let response = network
                .fetch(request)
                .await
                .map_err(|source| WorkerError::Install {
                    url: request.url.to_string(),
                    source,
                })?;
            if !response.is_ok() {
                return Err(WorkerError::Install {
                    url: request.url.to_string(),
                    source: FetchError::from_status(&request.url, response.status),
                });
            }
            Ok::<_, WorkerError>(response)
        }))
        .await?;

        let version = &self.inner.version;
        let created = self.inner.storage.open(version).await?;
        for (request, response) in requests.iter().zip(responses) {
            if let Err(e) = self.inner.storage.put(version, request, response).await {
                if created {
                    if let Err(cleanup) = self.inner.storage.delete(version).await {
                        warn!(version = %version, error = %cleanup, "Failed to remove partially populated cache");
                    }
                }
                return Err(e.into());
            }
        }

        Ok(requests.len())
    }

    // ===== Activate =====

    /// The receiver yields the deleted store names once the event settles
    /// successfully.
    pub fn on_activate(&self, event: &mut ExtendableEvent) -> oneshot::Receiver<Vec<String>> {
        let (tx, rx) = oneshot::channel();
        let worker = self.clone();
        event.wait_until(async move {
            let deleted = worker.activate().await?;
            let _ = tx.send(deleted);
            Ok(())
        });
        rx
    }

    /// Delete every store except this generation's, then claim all open
    /// clients. Returns the names of the deleted stores.
    pub async fn activate(&self) -> Result<Vec<String>, WorkerError> {
        self.transition(GenerationState::Activating).await?;

        match self.purge_and_claim().await {
            Ok(deleted) => {
                self.transition(GenerationState::Active).await?;
                info!(version = %self.inner.version, deleted = ?deleted, "Cache generation active");
                Ok(deleted)
            }
            Err(e) => {
                warn!(version = %self.inner.version, error = %e, "Cache generation activation failed");
                self.transition(GenerationState::Discarded).await?;
                Err(e)
            }
        }
    }

    async fn purge_and_claim(&self) -> Result<Vec<String>, WorkerError> {
        let storage = &self.inner.storage;
        let mut deleted = Vec::new();
        for name in storage.keys().await? {
            if name != self.inner.version && storage.delete(&name).await? {
                deleted.push(name);
            }
        }

        self.inner.clients.claim(&self.inner.version).await;
        Ok(deleted)
    }

    // ===== Fetch =====

    /// Take over retrieval requests; anything else is left to pass through.
    pub fn on_fetch(&self, event: &mut FetchEvent) {
        if !event.request().is_retrieval() {
            debug!(method = %event.request().method, url = %event.request().url, "Passing through non-GET request");
            return;
        }

        let worker = self.clone();
        let request = event.request().clone();
        event.respond_with(async move { worker.respond(&request).await });
    }

    /// Answer a retrieval request with the policy its origin selects.
    /// `None` means neither the network nor the cache could answer.
    ///
    /// Non-GET requests are refused with `NotIntercepted` without touching
    /// the network or the store.
    pub async fn respond(&self, request: &Request) -> Result<Option<Response>, WorkerError> {
        if !request.is_retrieval() {
            return Err(WorkerError::NotIntercepted {
                method: request.method.to_string(),
                url: request.url.to_string(),
            });
        }

        match self.strategy_for(request) {
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
        }
    }

    /// Stored copy if present, else a live fetch that is not stored.
    async fn cache_first(&self, request: &Request) -> Result<Option<Response>, WorkerError> {
        let storage = &self.inner.storage;
        if let Some(response) = storage.match_request(&self.inner.version, request).await? {
            debug!(url = %request.url, "Cache hit");
            return Ok(Some(response));
        }

        match self.inner.network.fetch(request).await {
            Ok(response) => {
                debug!(url = %request.url, status = response.status, "Cache miss, served from network");
                Ok(Some(response))
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache miss and network fetch failed");
                Ok(None)
            }
        }
    }

    /// Live fetch stored under the request, or the stored copy when the
    /// network fails.
    ///
    /// The write never recreates this generation's store: once a newer
    /// generation has deleted it, the live response is returned unstored.
    async fn network_first(&self, request: &Request) -> Result<Option<Response>, WorkerError> {
        let storage = &self.inner.storage;
        match self.inner.network.fetch(request).await {
            Ok(response) => {
                let stored = storage
                    .put_existing(&self.inner.version, request, response.clone())
                    .await?;
                if !stored {
                    debug!(version = %self.inner.version, url = %request.url, "Generation store removed, response not stored");
                }
                Ok(Some(response))
            }
            Err(e) => {
                let cached = storage.match_request(&self.inner.version, request).await?;
                if cached.is_some() {
                    debug!(url = %request.url, error = %e, "Network failed, served from cache");
                } else {
                    warn!(url = %request.url, error = %e, "Network failed and nothing cached");
                }
                Ok(cached)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
