//! Generation lifecycle and the events that drive it.

use std::fmt;
use std::future::Future;

use futures::future::{try_join_all, BoxFuture, FutureExt};
use tracing::debug;

use super::WorkerError;
use crate::fetch::{Request, Response};

/// Lifecycle state of one cache generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    /// Manifest is being fetched and stored
    Installing,
    /// Fully populated, waiting to take over
    Installed,
    /// Deleting older generations and claiming clients
    Activating,
    /// Serving requests
    Active,
    /// Replaced by a newer active generation
    Superseded,
    /// Install or activation failed; never serves requests
    Discarded,
}

impl GenerationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Superseded => "superseded",
            Self::Discarded => "discarded",
        }
    }

    pub fn can_transition_to(self, next: GenerationState) -> bool {
        use GenerationState::*;
        matches!(
            (self, next),
            (Installing, Installed)
                | (Installing, Discarded)
                | (Installed, Activating)
                | (Installed, Discarded)
                | (Activating, Active)
                | (Activating, Discarded)
                | (Active, Superseded)
        )
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    Install,
    Activate,
}

/// A lifecycle event that stays open until all work registered through
/// `wait_until` has finished.
pub struct ExtendableEvent {
    kind: LifecycleKind,
    pending: Vec<BoxFuture<'static, Result<(), WorkerError>>>,
}

impl ExtendableEvent {
    pub fn install() -> Self {
        Self::new(LifecycleKind::Install)
    }

    pub fn activate() -> Self {
        Self::new(LifecycleKind::Activate)
    }

    fn new(kind: LifecycleKind) -> Self {
        Self {
            kind,
            pending: Vec::new(),
        }
    }

    pub fn kind(&self) -> LifecycleKind {
        self.kind
    }

    /// Extend the event's lifetime until `future` resolves.
    pub fn wait_until<F>(&mut self, future: F)
    where
        F: Future<Output = Result<(), WorkerError>> + Send + 'static,
    {
        self.pending.push(future.boxed());
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Await every registered future. The first failure fails the event.
    pub async fn settle(self) -> Result<(), WorkerError> {
        debug!(kind = ?self.kind, pending = self.pending.len(), "Settling lifecycle event");
        try_join_all(self.pending).await?;
        Ok(())
    }
}

/// An intercepted request.
///
/// If no handler calls `respond_with`, the request passes through to plain
/// network handling. A substitute response of `None` is a failed load.
pub struct FetchEvent {
    request: Request,
    response: Option<BoxFuture<'static, Result<Option<Response>, WorkerError>>>,
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: None,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Supply the substitute response. Only the first call takes effect.
    pub fn respond_with<F>(&mut self, future: F)
    where
        F: Future<Output = Result<Option<Response>, WorkerError>> + Send + 'static,
    {
        if self.response.is_some() {
            debug!(url = %self.request.url, "Fetch event already has a response, ignoring");
            return;
        }
        self.response = Some(future.boxed());
    }

    pub fn is_handled(&self) -> bool {
        self.response.is_some()
    }

    pub fn into_response(self) -> Option<BoxFuture<'static, Result<Option<Response>, WorkerError>>> {
        self.response
    }
}
