use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::CacheError;
use crate::fetch::{Request, Response};

/// Entry file extension inside a store directory
const ENTRY_EXTENSION: &str = "json";

/// Counter for unique temp file names within this process
static NEXT_TEMP_ID: AtomicU64 = AtomicU64::new(1);

/// One stored request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    /// Request identity, `"<METHOD> <URL>"`
    pub key: String,
    pub url: String,
    pub response: Response,
    pub cached_at: DateTime<Utc>,
}

impl CachedEntry {
    pub fn new(request: &Request, response: Response) -> Self {
        Self {
            key: request.cache_key(),
            url: request.url.to_string(),
            response,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// Snapshot of storage activity since the storage was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub lookups: u64,
    pub hits: u64,
    pub writes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    lookups: AtomicU64,
    hits: AtomicU64,
    writes: AtomicU64,
}

/// Named cache stores persisted under a root directory.
///
/// Writes of a single entry go through a temp file and a rename, so a
/// reader never observes a half-written entry.
#[derive(Debug)]
pub struct CacheStorage {
    root: PathBuf,
    counters: Counters,
}

impl CacheStorage {
    pub fn new(root: PathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&root).map_err(|e| CacheError::io(&root, e))?;
        Ok(Self {
            root,
            counters: Counters::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cache names become directory names, so they must be a single
    /// plain path component.
    pub fn validate_name(name: &str) -> Result<(), CacheError> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(|c| matches!(c, '/' | '\\' | '\0'));
        if valid {
            Ok(())
        } else {
            Err(CacheError::InvalidCacheName(name.to_string()))
        }
    }

    fn store_path(&self, name: &str) -> Result<PathBuf, CacheError> {
        Self::validate_name(name)?;
        Ok(self.root.join(name))
    }

    fn entry_path(store: &Path, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        store.join(format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION))
    }

    /// Open a store, creating it if absent. Returns true if it was created.
    pub async fn open(&self, name: &str) -> Result<bool, CacheError> {
        let path = self.store_path(name)?;
        if self.has(name).await? {
            return Ok(false);
        }
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| CacheError::io(&path, e))?;
        debug!(cache = name, "Opened new cache store");
        Ok(true)
    }

    pub async fn has(&self, name: &str) -> Result<bool, CacheError> {
        let path = self.store_path(name)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| CacheError::io(&path, e))
    }

    /// Names of every existing store, sorted.
    pub async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| CacheError::io(&self.root, e))?;

        let mut names = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.root, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if Self::validate_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete a store and every entry in it. Returns false if it did not exist.
    pub async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let path = self.store_path(name)?;
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                debug!(cache = name, "Deleted cache store");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// Look up the stored response for `request` in store `name`.
    ///
    /// Non-GET requests and missing stores are plain misses.
    pub async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, CacheError> {
        let store = self.store_path(name)?;
        if !request.is_retrieval() {
            return Ok(None);
        }
        self.counters.lookups.fetch_add(1, Ordering::Relaxed);

        let path = Self::entry_path(&store, &request.cache_key());
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&path, e)),
        };

        let entry: CachedEntry = serde_json::from_str(&contents)
            .map_err(|source| CacheError::Serialization { path, source })?;

        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(entry.response))
    }

    /// Store `response` for `request` in store `name`, replacing any
    /// previous entry for the same request identity. The store is created
    /// if it does not exist yet.
    pub async fn put(
        &self,
        name: &str,
        request: &Request,
        response: Response,
    ) -> Result<(), CacheError> {
        if !request.is_retrieval() {
            return Err(CacheError::UnsupportedMethod(request.method.to_string()));
        }

        let store = self.store_path(name)?;
        tokio::fs::create_dir_all(&store)
            .await
            .map_err(|e| CacheError::io(&store, e))?;

        self.write_entry(name, &store, request, response).await
    }

    /// Like [`put`](Self::put), but never creates the store.
    ///
    /// Returns false and writes nothing when store `name` does not exist,
    /// including when it is deleted while the write is in flight.
    pub async fn put_existing(
        &self,
        name: &str,
        request: &Request,
        response: Response,
    ) -> Result<bool, CacheError> {
        if !request.is_retrieval() {
            return Err(CacheError::UnsupportedMethod(request.method.to_string()));
        }

        let store = self.store_path(name)?;
        match self.write_entry(name, &store, request, response).await {
            Ok(()) => Ok(true),
            Err(CacheError::Io { ref source, .. }) if source.kind() == ErrorKind::NotFound => {
                debug!(cache = name, key = %request.cache_key(), "Store is gone, write skipped");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn write_entry(
        &self,
        name: &str,
        store: &Path,
        request: &Request,
        response: Response,
    ) -> Result<(), CacheError> {
        let entry = CachedEntry::new(request, response);
        let path = Self::entry_path(store, &entry.key);
        let contents = serde_json::to_string_pretty(&entry).map_err(|source| {
            CacheError::Serialization {
                path: path.clone(),
                source,
            }
        })?;

        let temp = store.join(format!(
            ".{}-{}.tmp",
            std::process::id(),
            NEXT_TEMP_ID.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&temp, contents)
            .await
            .map_err(|e| CacheError::io(&temp, e))?;
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(CacheError::io(&path, e));
        }

        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        debug!(cache = name, key = %entry.key, "Stored cache entry");
        Ok(())
    }

    /// Every entry in store `name`, sorted by key. A missing store is empty.
    pub async fn entries(&self, name: &str) -> Result<Vec<CachedEntry>, CacheError> {
        let store = self.store_path(name)?;
        let mut dir = match tokio::fs::read_dir(&store).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&store, e)),
        };

        let mut entries = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&store, e))?
        {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| CacheError::io(&path, e))?;
            let entry: CachedEntry = serde_json::from_str(&contents)
                .map_err(|source| CacheError::Serialization { path, source })?;
            entries.push(entry);
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            lookups: self.counters.lookups.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use url::Url;

    fn request(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    fn storage() -> (tempfile::TempDir, CacheStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::new(dir.path().join("caches")).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_validate_name() {
        assert!(CacheStorage::validate_name("riplay-cache-v1").is_ok());

        assert!(CacheStorage::validate_name("").is_err());
        assert!(CacheStorage::validate_name("..").is_err());
        assert!(CacheStorage::validate_name(".hidden").is_err());
        assert!(CacheStorage::validate_name("a/b").is_err());
        assert!(CacheStorage::validate_name("a\\b").is_err());
    }

    #[test]
    fn test_cached_entry_age_display() {
        let req = request("https://riplay.example/");
        let mut entry = CachedEntry::new(&req, Response::new(200, "x"));
        assert_eq!(entry.age_display(), "just now");

        entry.cached_at = Utc::now() - Duration::minutes(90);
        assert_eq!(entry.age_display(), "1h ago");

        entry.cached_at = Utc::now() - Duration::days(3);
        assert_eq!(entry.age_display(), "3d ago");
    }

    #[tokio::test]
    async fn test_open_keys_delete() {
        let (_dir, storage) = storage();

        assert!(storage.open("riplay-cache-v1").await.unwrap());
        assert!(!storage.open("riplay-cache-v1").await.unwrap());
        storage.open("riplay-cache-v2").await.unwrap();

        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["riplay-cache-v1".to_string(), "riplay-cache-v2".to_string()]
        );

        assert!(storage.delete("riplay-cache-v1").await.unwrap());
        assert!(!storage.delete("riplay-cache-v1").await.unwrap());
        assert_eq!(storage.keys().await.unwrap(), vec!["riplay-cache-v2".to_string()]);
    }

    #[tokio::test]
    async fn test_put_overwrites_by_key() {
        let (_dir, storage) = storage();
        let req = request("https://riplay.example/index.html");

        storage.put("v1", &req, Response::new(200, "old")).await.unwrap();
        storage.put("v1", &req, Response::new(200, "new")).await.unwrap();

        let found = storage.match_request("v1", &req).await.unwrap().unwrap();
        assert_eq!(found.text(), "new");
        assert_eq!(storage.entries("v1").await.unwrap().len(), 1);
        assert_eq!(storage.stats().writes, 2);
    }

    #[tokio::test]
    async fn test_match_misses() {
        let (_dir, storage) = storage();
        let req = request("https://riplay.example/index.html");

        // Missing store
        assert!(storage.match_request("v1", &req).await.unwrap().is_none());

        // Missing key
        storage.put("v1", &request("https://riplay.example/"), Response::new(200, "root")).await.unwrap();
        assert!(storage.match_request("v1", &req).await.unwrap().is_none());

        // Stores are isolated from each other
        storage.put("v2", &req, Response::new(200, "v2")).await.unwrap();
        assert!(storage.match_request("v1", &req).await.unwrap().is_none());

        let stats = storage.stats();
        assert_eq!(stats.lookups, 3);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn test_put_rejects_non_get() {
        let (_dir, storage) = storage();
        let post = Request::parse("POST", "https://riplay.example/api").unwrap();

        let result = storage.put("v1", &post, Response::new(200, "")).await;
        assert!(matches!(result, Err(CacheError::UnsupportedMethod(_))));
        assert!(!storage.has("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_non_get_lookup_is_not_counted() {
        let (_dir, storage) = storage();
        let post = Request::parse("POST", "https://riplay.example/index.html").unwrap();

        assert!(storage.match_request("v1", &post).await.unwrap().is_none());
        assert_eq!(storage.stats(), CacheStats::default());
    }

    #[tokio::test]
    async fn test_put_existing_never_creates_store() {
        let (_dir, storage) = storage();
        let req = request("https://riplay.example/index.html");

        assert!(!storage.put_existing("v1", &req, Response::new(200, "x")).await.unwrap());
        assert!(!storage.has("v1").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
        assert_eq!(storage.stats().writes, 0);

        storage.open("v1").await.unwrap();
        assert!(storage.put_existing("v1", &req, Response::new(200, "x")).await.unwrap());
        let found = storage.match_request("v1", &req).await.unwrap().unwrap();
        assert_eq!(found.text(), "x");

        // Deleted after being written to
        storage.delete("v1").await.unwrap();
        assert!(!storage.put_existing("v1", &req, Response::new(200, "y")).await.unwrap());
        assert!(!storage.has("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let req = request("https://cdn.jsdelivr.net/gh/lipis/flag-icons@6.11.0/css/flag-icons.min.css");

        {
            let storage = CacheStorage::new(dir.path().to_path_buf()).unwrap();
            storage.put("v1", &req, Response::new(200, ".fi{}")).await.unwrap();
        }

        let storage = CacheStorage::new(dir.path().to_path_buf()).unwrap();
        let entries = storage.entries("v1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, req.url.to_string());
        assert_eq!(entries[0].response.text(), ".fi{}");
    }
}
