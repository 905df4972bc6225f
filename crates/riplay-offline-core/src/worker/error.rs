use thiserror::Error;

use super::GenerationState;
use crate::cache::CacheError;
use crate::fetch::FetchError;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to fetch manifest entry {url}: {source}")]
    Install {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Invalid generation state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: GenerationState,
        to: GenerationState,
    },

    #[error("{method} {url} is not handled by the cache worker")]
    NotIntercepted { method: String, url: String },

    #[error("Invalid manifest entry {entry:?}: {reason}")]
    InvalidManifestEntry { entry: String, reason: String },
}
