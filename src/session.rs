//! Explicit request cache for reference fetches.
//!
//! A [`ClientSession`] is created per run and handed to whatever needs cached
//! reference data, so nothing survives between runs or tests unless a caller
//! shares the session on purpose. Entries are grouped by scope (the entity
//! kind for [`CachedSource`]) and expire after an optional TTL. Concurrent
//! requests for the same key wait for the first fetch instead of issuing
//! their own.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use log::debug;
use tokio::sync::Mutex;

use crate::store::{Record, ReferenceSource, StoreError};

type CacheKey = (String, String);

#[derive(Debug, Clone)]
struct CacheEntry {
    records: Arc<Vec<Record>>,
    stored_at: Instant,
}

#[derive(Debug, Default)]
pub struct ClientSession {
    ttl: Option<Duration>,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    pending: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl ClientSession {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    async fn lookup(&self, key: &CacheKey) -> Option<Arc<Vec<Record>>> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get(key)?;
        if self.ttl.is_some_and(|ttl| entry.stored_at.elapsed() > ttl) {
            entries.remove(key);
            return None;
        }
        Some(Arc::clone(&entry.records))
    }

    pub async fn get_or_fetch<F, Fut>(
        &self,
        scope: &str,
        key: &str,
        fetch: F,
    ) -> Result<Arc<Vec<Record>>, StoreError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: std::future::Future<Output = Result<Vec<Record>, StoreError>> + Send,
    {
        let cache_key = (scope.to_string(), key.to_string());
        if let Some(hit) = self.lookup(&cache_key).await {
            return Ok(hit);
        }

        let gate = Arc::clone(
            self.pending
                .lock()
                .await
                .entry(cache_key.clone())
                .or_default(),
        );
        let _guard = gate.lock().await;
        if let Some(hit) = self.lookup(&cache_key).await {
            return Ok(hit);
        }

        debug!("Session cache miss for {scope}/{key}");
        let result = fetch().await;
        self.pending.lock().await.remove(&cache_key);
        let records = Arc::new(result?);
        self.entries.lock().await.insert(
            cache_key,
            CacheEntry {
                records: Arc::clone(&records),
                stored_at: Instant::now(),
            },
        );
        Ok(records)
    }

    /// Drops every cached entry under `scope`.
    pub async fn clear(&self, scope: &str) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|(entry_scope, _), _| entry_scope != scope);
        before - entries.len()
    }

    pub async fn clear_all(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// [`ReferenceSource`] wrapper that serves `fetch_all` from a session cache.
pub struct CachedSource<'a> {
    inner: &'a dyn ReferenceSource,
    session: &'a ClientSession,
}

impl<'a> CachedSource<'a> {
    pub fn new(inner: &'a dyn ReferenceSource, session: &'a ClientSession) -> Self {
        Self { inner, session }
    }
}

#[async_trait]
impl ReferenceSource for CachedSource<'_> {
    async fn fetch_all(&self, kind: &str) -> Result<Vec<Record>, StoreError> {
        let records = self
            .session
            .get_or_fetch(kind, "all", || self.inner.fetch_all(kind))
            .await?;
        Ok(records.as_ref().clone())
    }

    async fn fetch_by_field(
        &self,
        kind: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<Record>, StoreError> {
        let key = format!("{field}={value}");
        let records = self
            .session
            .get_or_fetch(kind, &key, || async move {
                self.inner
                    .fetch_by_field(kind, field, value)
                    .await
                    .map(|found| found.into_iter().collect::<Vec<_>>())
            })
            .await?;
        Ok(records.first().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::store::MemoryStore;

    struct CountingSource {
        inner: MemoryStore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReferenceSource for CountingSource {
        async fn fetch_all(&self, kind: &str) -> Result<Vec<Record>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_all(kind).await
        }

        async fn fetch_by_field(
            &self,
            kind: &str,
            field: &str,
            value: &str,
        ) -> Result<Option<Record>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_by_field(kind, field, value).await
        }
    }

    async fn source() -> CountingSource {
        let inner = MemoryStore::new();
        inner.insert("users", vec![Record::new("u1")]).await;
        CountingSource {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn cached_source_fetches_once_per_kind() {
        let source = source().await;
        let session = ClientSession::new(None);
        let cached = CachedSource::new(&source, &session);

        assert_eq!(cached.fetch_all("users").await.unwrap().len(), 1);
        assert_eq!(cached.fetch_all("users").await.unwrap().len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_scope_forces_refetch() {
        let source = source().await;
        let session = ClientSession::new(None);
        let cached = CachedSource::new(&source, &session);

        cached.fetch_all("users").await.unwrap();
        assert_eq!(session.clear("users").await, 1);
        assert_eq!(session.clear("contacts").await, 0);
        cached.fetch_all("users").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let source = source().await;
        let session = ClientSession::new(Some(Duration::from_millis(0)));
        let cached = CachedSource::new(&source, &session);

        cached.fetch_all("users").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cached.fetch_all("users").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_fetches_are_not_cached() {
        let source = source().await;
        let session = ClientSession::new(None);
        let cached = CachedSource::new(&source, &session);

        assert!(cached.fetch_all("missing").await.is_err());
        assert_eq!(session.len().await, 0);
    }
}
