//! riplay-offline-core - offline asset caching for the riplay site.
//!
//! This crate intercepts the page's retrieval requests and answers them
//! from a single versioned cache generation:
//! - same-origin requests are served network-first, falling back to cache
//! - cross-origin (CDN) requests are served cache-first
//!
//! A new generation is populated from a static manifest at install time
//! and replaces every older generation on activation.

pub mod cache;
pub mod config;
pub mod fetch;
pub mod host;
pub mod worker;

pub use cache::{CacheError, CacheStorage, CachedEntry};
pub use config::Config;
pub use fetch::{classify, FetchError, HttpNetwork, Network, Request, Response, Strategy};
pub use host::{Host, HostError, Registration};
pub use worker::{
    CacheWorker, ClientId, ClientRegistry, ExtendableEvent, FetchEvent, GenerationState,
    Manifest, WorkerError,
};
