use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

/// Client ID counter
static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// An open page that a generation may control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Open clients and the generation (by version) controlling each.
/// Clone is cheap and shares the registry.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<RwLock<BTreeMap<ClientId, Option<String>>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened page, controlled by `controller` if any.
    pub async fn connect(&self, controller: Option<String>) -> ClientId {
        let id = ClientId::next();
        self.clients.write().await.insert(id, controller);
        id
    }

    pub async fn disconnect(&self, id: ClientId) -> bool {
        self.clients.write().await.remove(&id).is_some()
    }

    pub async fn controller(&self, id: ClientId) -> Option<String> {
        self.clients.read().await.get(&id).cloned().flatten()
    }

    /// Put every open client under the control of `version`.
    /// Returns the number of clients whose controller changed.
    pub async fn claim(&self, version: &str) -> usize {
        let mut clients = self.clients.write().await;
        let mut changed = 0;
        for controller in clients.values_mut() {
            if controller.as_deref() != Some(version) {
                *controller = Some(version.to_string());
                changed += 1;
            }
        }
        info!(version, claimed = changed, total = clients.len(), "Claimed clients");
        changed
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}
