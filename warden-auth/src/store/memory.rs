//! In-process session store
//!
//! Entries carry their own deadline. Reads ignore entries past it;
//! [`MemorySessionStore::purge_expired`] drops them physically.

use super::ttl_duration;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;
use warden_core::{Session, SessionStore, WardenResult};

#[derive(Debug, Clone)]
struct StoredEntry {
    session: Session,
    deadline: Option<Instant>,
}

impl StoredEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.deadline.map_or(true, |deadline| now < deadline)
    }
}

/// Session store backed by a `HashMap`
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<RwLock<HashMap<String, StoredEntry>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove entries whose TTL has elapsed, returning how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let purged = before - entries.len();
        if purged > 0 {
            debug!("Purged {} expired sessions", purged);
        }
        purged
    }

    /// Number of entries physically held, live or not
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn set(
        &self,
        key: &str,
        session: Option<&Session>,
        ttl_seconds: u64,
    ) -> WardenResult<()> {
        let now = Instant::now();
        let ttl = ttl_duration(ttl_seconds);
        let mut entries = self.entries.write().await;

        match session {
            Some(session) => {
                let mut session = session.clone();
                session.user = session.user.compacted();
                let deadline = match ttl {
                    Some(ttl) => Some(now + ttl),
                    None => entries.get(key).and_then(|entry| entry.deadline),
                };
                entries.insert(key.to_string(), StoredEntry { session, deadline });
            }
            None => {
                if let (Some(entry), Some(ttl)) = (entries.get_mut(key), ttl) {
                    entry.deadline = Some(now + ttl);
                }
            }
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> WardenResult<Option<Session>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.session.clone()))
    }

    async fn remove(&self, key: &str) -> WardenResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
