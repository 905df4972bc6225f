use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use url::Url;

use super::WorkerError;

/// Version string of the generation shipped with the site
pub const DEFAULT_CACHE_NAME: &str = "riplay-cache-v1";

/// Page assets plus the CDN stylesheets the page links to.
const DEFAULT_ENTRIES: &[&str] = &[
    "/",
    "/index.html",
    "/css/base.css",
    "/css/style.css",
    "/js/app.js",
    "/locales/en.json",
    "/locales/cs.json",
    "/locales/de.json",
    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css",
    "https://cdn.jsdelivr.net/gh/lipis/flag-icons@6.11.0/css/flag-icons.min.css",
];

/// Ordered list of resources pre-populated into a new generation.
///
/// Entries are absolute URLs or root-relative paths; the latter are
/// resolved against the page origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: Vec<String>,
}

impl Manifest {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve every entry to an absolute URL, keeping manifest order.
    ///
    /// Two entries resolving to the same URL are rejected, as the cache
    /// could not hold both.
    pub fn resolve(&self, base: &Url) -> Result<Vec<Url>, WorkerError> {
        let mut seen = HashSet::new();
        let mut urls = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let mut url = base
                .join(entry)
                .map_err(|e| WorkerError::InvalidManifestEntry {
                    entry: entry.clone(),
                    reason: e.to_string(),
                })?;
            url.set_fragment(None);

            if !seen.insert(url.clone()) {
                return Err(WorkerError::InvalidManifestEntry {
                    entry: entry.clone(),
                    reason: "duplicate entry".to_string(),
                });
            }
            urls.push(url);
        }

        Ok(urls)
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new(DEFAULT_ENTRIES.iter().copied())
    }
}
