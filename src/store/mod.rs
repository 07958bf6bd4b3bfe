#[cfg(feature = "dashmap")]
#[cfg_attr(docsrs, doc(cfg(feature = "dashmap")))]
pub mod memory;

#[cfg(feature = "redis")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
pub mod redis;

use actix_web::rt::time::Instant;
use async_trait::async_trait;
use std::time::Duration;

/// The per-key rate limit record.
///
/// One record exists per distinct key; it describes how much of the quota
/// the key has consumed in its current window, and when that window ends.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Limit {
    /// Maximum number of requests permitted per window, fixed at creation.
    pub total: u64,
    /// Requests left in the current window.
    pub remaining: u64,
    /// Time at which the current window ends.
    pub reset_at: Instant,
}

impl Limit {
    /// Create a record for a fresh window starting now.
    ///
    /// `remaining` starts at the full quota; consuming the request that
    /// triggered creation is the caller's responsibility.
    pub fn new(max: u64, duration: Duration) -> Self {
        Self {
            total: max,
            remaining: max,
            reset_at: Instant::now() + duration,
        }
    }

    /// Whether the window this record describes has ended.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.reset_at
    }

    /// Time left until the window ends, zero once it has ended.
    pub fn until_reset(&self) -> Duration {
        self.reset_at.saturating_duration_since(Instant::now())
    }

    /// Minutes until the window ends (rounded upwards, so that a client
    /// waiting for the stated time is guaranteed to land in a new window).
    pub fn minutes_until_reset(&self) -> u64 {
        let millis = self.until_reset().as_millis() as f64;
        (millis / 60_000f64).ceil() as u64
    }
}

/// A pluggable key-value store holding [Limit] records with expiry.
///
/// A store is required to implement [Clone], usually this means wrapping the
/// underlying data store within an [Arc](std::sync::Arc), although many
/// connection pools already do so internally; there is no need to wrap it
/// twice.
///
/// Both operations must be atomic with respect to a single key; unrelated
/// keys must never contend. Note that the guard issues a [get](Self::get)
/// followed by a [set](Self::set) for every evaluation and that pair is not
/// transactional: two in-flight requests racing on the same key may observe
/// the same record and undercount the consumed quota.
#[async_trait(?Send)]
pub trait LimitStore: Clone {
    type Error;

    /// Look up the record for a key.
    ///
    /// Returns `None` if the key is absent or its entry has expired from
    /// the store.
    async fn get(&self, key: &str) -> Result<Option<Limit>, Self::Error>;

    /// Write the record for a key, to be evicted once `ttl` has elapsed.
    async fn set(&self, key: &str, limit: Limit, ttl: Duration) -> Result<(), Self::Error>;
}
