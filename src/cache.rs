//! Compute-once concurrent map.
//!
//! Each key owns an async once-cell. The map shard lock is only held while the
//! cell is looked up or inserted, so producing a value for one key never
//! blocks callers working on another key. Concurrent callers for the same key
//! await the single winner; a failed initialization leaves the cell empty so
//! the next caller tries again.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

/// Concurrent map with single-flight value construction.
#[derive(Debug)]
pub struct OnceMap<K, V>
where
    K: Eq + Hash,
{
    inner: DashMap<K, Arc<OnceCell<Arc<V>>>>,
}

impl<K, V> Default for OnceMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }
}

impl<K, V> OnceMap<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the value for `key`, running `init` only if no value exists yet.
    pub async fn get_or_try_init<F, Fut, E>(&self, key: &K, init: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.cell(key);
        cell.get_or_try_init(|| async { init().await.map(Arc::new) })
            .await
            .cloned()
    }

    /// Value for `key` if it has been initialized.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.inner.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Drop the entry for `key`. Returns true if an initialized value was removed.
    pub fn remove(&self, key: &K) -> bool {
        self.inner
            .remove(key)
            .map(|(_, cell)| cell.initialized())
            .unwrap_or(false)
    }

    /// Drop every entry, returning how many initialized values were removed.
    pub fn clear(&self) -> usize {
        let count = self.len();
        self.inner.clear();
        count
    }

    /// Number of initialized entries.
    pub fn len(&self) -> usize {
        self.inner.iter().filter(|e| e.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys with an initialized value.
    pub fn keys(&self) -> Vec<K> {
        self.inner
            .iter()
            .filter(|e| e.value().initialized())
            .map(|e| e.key().clone())
            .collect()
    }

    fn cell(&self, key: &K) -> Arc<OnceCell<Arc<V>>> {
        if let Some(cell) = self.inner.get(key) {
            return cell.clone();
        }
        self.inner.entry(key.clone()).or_default().clone()
    }
}
