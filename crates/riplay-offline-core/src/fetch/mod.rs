//! Request/response model and network access.
//!
//! This module provides:
//! - `Request` / `Response`: the intercepted request and a fully buffered response
//! - `classify`: origin-based selection of the retrieval `Strategy`
//! - `Network`: the seam the cache manager fetches through, with the
//!   `reqwest`-backed `HttpNetwork` implementation

pub mod error;
pub mod network;
pub mod request;

#[cfg(test)]
pub(crate) mod testing;

pub use error::FetchError;
pub use network::{HttpNetwork, Network};
pub use request::{classify, Request, Response, Strategy};
