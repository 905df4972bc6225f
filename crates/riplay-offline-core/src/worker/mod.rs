//! The offline cache manager.
//!
//! This module provides:
//! - `CacheWorker`: install / activate / fetch handling for one cache generation
//! - `Manifest`: the resources pre-loaded into a new generation
//! - `GenerationState`: the per-generation lifecycle state machine
//! - `ExtendableEvent` / `FetchEvent`: lifecycle and fetch events whose work
//!   is awaited before the event counts as handled
//! - `ClientRegistry`: open pages and the generation controlling each

pub mod clients;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod manifest;

pub use clients::{ClientId, ClientRegistry};
pub use error::WorkerError;
pub use lifecycle::{ExtendableEvent, FetchEvent, GenerationState, LifecycleKind};
pub use manager::CacheWorker;
pub use manifest::{Manifest, DEFAULT_CACHE_NAME};
