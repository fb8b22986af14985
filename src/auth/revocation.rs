/// Token Revocation (blocklist)
///
/// Logout records a token's `jti` here; every authenticated request checks
/// it. Entries live exactly as long as the longest token the service can
/// issue, after which the token would have expired on its own anyway.
///
/// The service may run as several instances, so production uses the shared
/// Redis store. The in-memory store is for tests and single-process setups.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::error::{AppError, CacheError};

const KEY_PREFIX: &str = "token_blocklist";

/// Set of revoked token ids with expiry-based eviction
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Mark `jti` as revoked. Revoking twice is the same as revoking once.
    async fn revoke(&self, jti: &str) -> Result<(), AppError>;

    /// Whether `jti` is currently on the blocklist
    async fn is_revoked(&self, jti: &str) -> Result<bool, AppError>;
}

/// Redis-backed blocklist shared by every instance of the service
#[derive(Clone)]
pub struct RedisRevocationStore {
    connection: ConnectionManager,
    ttl: Duration,
}

impl RedisRevocationStore {
    /// Connect to Redis at `url`; entries expire after `ttl`
    ///
    /// # Errors
    /// Returns a cache error if the URL is invalid or Redis is unreachable
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, AppError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self { connection, ttl })
    }

    fn key(jti: &str) -> String {
        format!("{}:{}", KEY_PREFIX, jti)
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn revoke(&self, jti: &str) -> Result<(), AppError> {
        let mut conn = self.connection.clone();

        // NX keeps the first deadline, so a repeated logout never extends it
        redis::cmd("SET")
            .arg(Self::key(jti))
            .arg(1)
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .arg("NX")
            .query_async::<_, ()>(&mut conn)
            .await?;

        tracing::debug!(token_id = %jti, "Token id added to blocklist");
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, AppError> {
        let mut conn = self.connection.clone();
        let revoked = redis::cmd("EXISTS")
            .arg(Self::key(jti))
            .query_async::<_, bool>(&mut conn)
            .await?;
        Ok(revoked)
    }
}

/// In-process blocklist
///
/// - No IO
/// - Expired entries are dropped lazily on each call
#[derive(Debug)]
pub struct InMemoryRevocationStore {
    entries: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl InMemoryRevocationStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|deadline| **deadline > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> AppError {
    AppError::Cache(CacheError::CommandFailed("revocation store lock poisoned".to_string()))
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn revoke(&self, jti: &str) -> Result<(), AppError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;

        entries.retain(|_, deadline| *deadline > now);
        entries.entry(jti.to_string()).or_insert(now + self.ttl);
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, AppError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;

        match entries.get(jti) {
            Some(deadline) if *deadline > now => Ok(true),
            Some(_) => {
                entries.remove(jti);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_token_is_not_revoked() {
        let store = InMemoryRevocationStore::new(Duration::from_secs(60));
        assert!(!store.is_revoked("never-seen").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let store = InMemoryRevocationStore::new(Duration::from_secs(60));

        store.revoke("jti-1").await.unwrap();
        assert!(store.is_revoked("jti-1").await.unwrap());

        store.revoke("jti-1").await.unwrap();
        assert!(store.is_revoked("jti-1").await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_revocations_are_independent() {
        let store = InMemoryRevocationStore::new(Duration::from_secs(60));

        store.revoke("jti-1").await.unwrap();
        assert!(!store.is_revoked("jti-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_entries_are_evicted_after_ttl() {
        let store = InMemoryRevocationStore::new(Duration::from_millis(50));

        store.revoke("jti-1").await.unwrap();
        assert!(store.is_revoked("jti-1").await.unwrap());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!store.is_revoked("jti-1").await.unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_redis_key_layout() {
        assert_eq!(RedisRevocationStore::key("abc"), "token_blocklist:abc");
    }
}
