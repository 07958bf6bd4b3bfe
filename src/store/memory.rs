use crate::store::{Limit, LimitStore};
use actix_web::rt::task::JoinHandle;
use actix_web::rt::time::Instant;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_GC_INTERVAL_SECONDS: u64 = 60 * 10;

/// A [LimitStore] that uses [Dashmap](dashmap::DashMap) to keep records in
/// process memory.
#[derive(Clone)]
pub struct InMemoryStore {
    map: Arc<DashMap<String, Value>>,
    gc_handle: Option<Arc<JoinHandle<()>>>,
}

struct Value {
    ttl: Instant,
    limit: Limit,
}

impl InMemoryStore {
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder {
            gc_interval: Some(Duration::from_secs(DEFAULT_GC_INTERVAL_SECONDS)),
        }
    }

    fn garbage_collector(map: Arc<DashMap<String, Value>>, interval: Duration) -> JoinHandle<()> {
        assert!(
            interval.as_secs_f64() > 0f64,
            "GC interval must be non-zero"
        );
        actix_web::rt::spawn(async move {
            loop {
                let now = Instant::now();
                map.retain(|_k, v| v.ttl > now);
                actix_web::rt::time::sleep_until(now + interval).await;
            }
        })
    }

    /// Removes the record for a given rate limit key, resetting its quota.
    pub fn remove_key(&self, key: &str) {
        self.map.remove(key);
    }
}

#[async_trait(?Send)]
impl LimitStore for InMemoryStore {
    type Error = actix_web::Error;

    async fn get(&self, key: &str) -> Result<Option<Limit>, Self::Error> {
        let now = Instant::now();
        // Expired entries are filtered out here; the garbage collector only
        // bounds how long they occupy memory.
        Ok(self
            .map
            .get(key)
            .filter(|v| v.ttl > now)
            .map(|v| v.limit.clone()))
    }

    async fn set(&self, key: &str, limit: Limit, ttl: Duration) -> Result<(), Self::Error> {
        let value = Value {
            ttl: Instant::now() + ttl,
            limit,
        };
        self.map.insert(key.to_string(), value);
        Ok(())
    }
}

impl Drop for InMemoryStore {
    fn drop(&mut self) {
        if let Some(handle) = &self.gc_handle {
            handle.abort();
        }
    }
}

pub struct InMemoryStoreBuilder {
    gc_interval: Option<Duration>,
}

impl InMemoryStoreBuilder {
    /// Override the default garbage collector interval.
    ///
    /// Set to None to disable garbage collection.
    ///
    /// The garbage collector periodically scans the internal map, removing
    /// expired entries.
    pub fn with_gc_interval(mut self, interval: Option<Duration>) -> Self {
        self.gc_interval = interval;
        self
    }

    pub fn build(self) -> InMemoryStore {
        let map = Arc::new(DashMap::<String, Value>::new());
        let gc_handle = self
            .gc_interval
            .map(|gc_interval| Arc::new(InMemoryStore::garbage_collector(map.clone(), gc_interval)));
        InMemoryStore { map, gc_handle }
    }
}
