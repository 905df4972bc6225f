//! Cache storage for offline asset delivery.
//!
//! This module provides the `CacheStorage` holding named cache stores.
//! Each store is one cache generation, named by its version string, and
//! maps request identities to the last response stored for them.
//!
//! Stores live on disk as one directory per generation with one JSON file
//! per entry.

pub mod error;
pub mod storage;

pub use error::CacheError;
pub use storage::{CacheStats, CacheStorage, CachedEntry};
