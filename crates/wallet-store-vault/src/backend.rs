//! Key-value secrets backend abstraction.
//!
//! - [`SecretsBackend`]: the put/get/list surface the wallet store needs
//! - [`MemoryBackend`]: in-process implementation with Vault-style listing

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::paths::SEPARATOR;
use crate::{Result, StoreError};

/// Flat field map stored at a single backend path.
pub type SecretData = HashMap<String, String>;

/// Versioned key-value secrets service.
///
/// Implementations must be safe to share between concurrent store and
/// enumeration calls; the store layers no locking on top.
#[async_trait]
pub trait SecretsBackend: Send + Sync + 'static {
    /// Write a new version of the value at `path`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if the write is rejected or the service
    /// is unreachable.
    async fn put(&self, path: &str, value: &SecretData) -> Result<()>;

    /// Read the current version of the value at `path`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the path has no current version,
    /// or `StoreError::Backend` for other failures.
    async fn get(&self, path: &str) -> Result<SecretData>;

    /// List the immediate children of `prefix`.
    ///
    /// Nested scopes are returned with a trailing `/`. A prefix with no
    /// children lists as empty rather than failing.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Short name of the backend kind.
    fn name(&self) -> &'static str;

    /// Where the backend lives (address, or a descriptive label).
    fn location(&self) -> String;
}

/// In-memory secrets backend.
///
/// Listing mirrors Vault's KV2 metadata listing: one level below the prefix,
/// with directories suffixed by `/`.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, SecretData>>,
    writes: AtomicUsize,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put` calls so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of paths currently holding a value.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SecretsBackend for MemoryBackend {
    async fn put(&self, path: &str, value: &SecretData) -> Result<()> {
        let path = path.trim_matches(SEPARATOR);
        if path.is_empty() {
            return Err(StoreError::Backend("empty path".to_string()));
        }

        self.entries
            .write()
            .await
            .insert(path.to_string(), value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);

        debug!(path = %path, "Stored value");
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<SecretData> {
        let path = path.trim_matches(SEPARATOR);

        self.entries
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.trim_matches(SEPARATOR);
        let scope = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}{SEPARATOR}")
        };

        let entries = self.entries.read().await;
        let children: BTreeSet<String> = entries
            .keys()
            .filter_map(|key| key.strip_prefix(scope.as_str()))
            .map(|rest| match rest.split_once(SEPARATOR) {
                Some((dir, _)) => format!("{dir}{SEPARATOR}"),
                None => rest.to_string(),
            })
            .collect();

        Ok(children.into_iter().collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(s: &str) -> SecretData {
        HashMap::from([("data".to_string(), s.to_string())])
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let backend = MemoryBackend::new();

        backend.put("wallets/a/a", &value("header")).await.unwrap();

        let read = backend.get("wallets/a/a").await.unwrap();
        assert_eq!(read["data"], "header");
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let backend = MemoryBackend::new();

        let result = backend.get("wallets/missing").await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let backend = MemoryBackend::new();

        backend.put("k", &value("v1")).await.unwrap();
        backend.put("k", &value("v2")).await.unwrap();

        assert_eq!(backend.get("k").await.unwrap()["data"], "v2");
        assert_eq!(backend.len().await, 1);
        assert_eq!(backend.write_count(), 2);
    }

    #[tokio::test]
    async fn test_list_is_one_level_with_directory_markers() {
        let backend = MemoryBackend::new();

        backend.put("wallets/a/a", &value("")).await.unwrap();
        backend.put("wallets/a/index", &value("")).await.unwrap();
        backend.put("wallets/a/b", &value("")).await.unwrap();
        backend.put("wallets/a/nested/deep", &value("")).await.unwrap();
        backend.put("wallets/c/c", &value("")).await.unwrap();

        assert_eq!(backend.list("wallets").await.unwrap(), vec!["a/", "c/"]);
        assert_eq!(
            backend.list("wallets/a").await.unwrap(),
            vec!["a", "b", "index", "nested/"]
        );
        // Trailing separator on the prefix is tolerated
        assert_eq!(backend.list("wallets/c/").await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn test_list_missing_prefix_is_empty() {
        let backend = MemoryBackend::new();
        assert!(backend.list("wallets").await.unwrap().is_empty());
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_does_not_match_partial_segments() {
        let backend = MemoryBackend::new();

        backend.put("walletsX/a", &value("")).await.unwrap();

        assert!(backend.list("wallets").await.unwrap().is_empty());
    }
}
