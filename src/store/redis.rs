use crate::store::{Limit, LimitStore};
use actix_web::rt::time::Instant;
use actix_web::{HttpResponse, ResponseError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;

const TOTAL_FIELD: &str = "total";
const REMAINING_FIELD: &str = "remaining";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Redis error: {0}")]
    Redis(
        #[source]
        #[from]
        redis::RedisError,
    ),
}

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::InternalServerError().finish()
    }
}

/// A [LimitStore] that keeps records in Redis.
///
/// A record is stored as a hash whose key expires with the window, so the
/// reset time is recovered from the key's remaining time-to-live on read.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    key_prefix: Option<String>,
}

impl RedisStore {
    /// Create a RedisStore builder.
    ///
    /// # Arguments
    ///
    /// * `connection`: A [Redis connection manager](redis::aio::ConnectionManager)
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use actix_rate_guard::store::redis::RedisStore;
    /// # use redis::aio::ConnectionManager;
    /// # async fn example() {
    /// let client = redis::Client::open("redis://127.0.0.1/").unwrap();
    /// let manager = ConnectionManager::new(client).await.unwrap();
    /// let store = RedisStore::builder(manager).build();
    /// # };
    /// ```
    pub fn builder(connection: ConnectionManager) -> Builder {
        Builder {
            connection,
            key_prefix: None,
        }
    }

    fn make_key<'t>(&self, key: &'t str) -> Cow<'t, str> {
        match &self.key_prefix {
            None => Cow::Borrowed(key),
            Some(prefix) => Cow::Owned(format!("{prefix}{key}")),
        }
    }

    /// Removes the record for a given rate limit key, resetting its quota.
    ///
    /// Note that the key prefix (if set) is automatically included, you do
    /// not need to prepend it yourself.
    pub async fn remove_key(&self, key: &str) -> Result<(), Error> {
        let key = self.make_key(key);
        let mut con = self.connection.clone();
        let () = con.del(key.as_ref()).await?;
        Ok(())
    }
}

pub struct Builder {
    connection: ConnectionManager,
    key_prefix: Option<String>,
}

impl Builder {
    /// Apply an optional prefix to all rate limit keys given to this store.
    ///
    /// This may be useful when the Redis instance is being used for other
    /// purposes; the prefix is used as a 'namespace' to avoid collision with
    /// other caches or keys inside Redis.
    pub fn key_prefix(mut self, key_prefix: Option<&str>) -> Self {
        self.key_prefix = key_prefix.map(ToOwned::to_owned);
        self
    }

    pub fn build(self) -> RedisStore {
        RedisStore {
            connection: self.connection,
            key_prefix: self.key_prefix,
        }
    }
}

#[async_trait(?Send)]
impl LimitStore for RedisStore {
    type Error = Error;

    async fn get(&self, key: &str) -> Result<Option<Limit>, Self::Error> {
        let key = self.make_key(key);

        let mut pipe = redis::pipe();
        pipe.atomic()
            // Read the record fields
            .cmd("HMGET")
            .arg(key.as_ref())
            .arg(TOTAL_FIELD)
            .arg(REMAINING_FIELD)
            // Return time-to-live of the key
            .cmd("PTTL")
            .arg(key.as_ref());

        let mut con = self.connection.clone();
        let (fields, pttl): (Vec<Option<u64>>, i64) = pipe.query_async(&mut con).await?;
        // PTTL is negative when the key is missing, or carries no expiry
        // (i.e. it was not written by this store)
        if pttl < 0 {
            return Ok(None);
        }
        let (total, remaining) = match (
            fields.first().copied().flatten(),
            fields.get(1).copied().flatten(),
        ) {
            (Some(total), Some(remaining)) => (total, remaining),
            _ => return Ok(None),
        };
        Ok(Some(Limit {
            total,
            remaining,
            reset_at: Instant::now() + Duration::from_millis(pttl as u64),
        }))
    }

    async fn set(&self, key: &str, limit: Limit, ttl: Duration) -> Result<(), Self::Error> {
        let key = self.make_key(key);

        let mut pipe = redis::pipe();
        pipe.atomic()
            // Write the record fields
            .cmd("HSET")
            .arg(key.as_ref())
            .arg(TOTAL_FIELD)
            .arg(limit.total)
            .arg(REMAINING_FIELD)
            .arg(limit.remaining)
            .ignore()
            // Expire the entry with the window
            .cmd("PEXPIRE")
            .arg(key.as_ref())
            .arg(ttl.as_millis() as u64)
            .ignore();

        let mut con = self.connection.clone();
        let () = pipe.query_async(&mut con).await?;
        Ok(())
    }
}
