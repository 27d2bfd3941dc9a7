use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::session::store::{Session, SessionHandle, SessionStore, SessionStoreError};

/// A stored session plus its sliding expiry
#[derive(Debug)]
struct Entry {
    handle: SessionHandle,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }
}

/// In-memory implementation of SessionStore
#[derive(Debug)]
pub struct InMemorySessionStore {
    /// Thread-safe storage of sessions
    sessions: Arc<RwLock<HashMap<String, Entry>>>,
    /// Idle lifetime; `None` keeps sessions until deleted
    ttl: Option<Duration>,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionStore {
    /// Create a store whose sessions never expire
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl: None,
        }
    }

    /// Create a store whose sessions expire after `ttl` without access
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl: Some(ttl),
        }
    }

    fn next_expiry(&self) -> Option<DateTime<Utc>> {
        self.ttl.map(|ttl| Utc::now() + ttl)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, id: String) -> Result<SessionHandle, SessionStoreError> {
        let handle = Arc::new(Mutex::new(Session::new(id.clone())));

        let mut sessions = self.sessions.write().map_err(|e| {
            SessionStoreError::StorageError(format!("Failed to acquire write lock: {}", e))
        })?;

        sessions.insert(
            id.clone(),
            Entry {
                handle: handle.clone(),
                expires_at: self.next_expiry(),
            },
        );
        debug!("Created session: {}", id);

        Ok(handle)
    }

    async fn get_session(&self, id: &str) -> Result<SessionHandle, SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(|e| {
            SessionStoreError::StorageError(format!("Failed to acquire write lock: {}", e))
        })?;

        let next_expiry = self.next_expiry();
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| SessionStoreError::NotFound(id.to_string()))?;

        // Check if session has expired
        if entry.is_expired(Utc::now()) {
            return Err(SessionStoreError::NotFound(format!("Session expired: {}", id)));
        }

        entry.expires_at = next_expiry;
        Ok(entry.handle.clone())
    }

    async fn delete_session(&self, id: &str) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(|e| {
            SessionStoreError::StorageError(format!("Failed to acquire write lock: {}", e))
        })?;

        if sessions.remove(id).is_none() {
            return Err(SessionStoreError::NotFound(id.to_string()));
        }

        debug!("Deleted session: {}", id);
        Ok(())
    }

    async fn cleanup_expired_sessions(&self) -> Result<usize, SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(|e| {
            SessionStoreError::StorageError(format!("Failed to acquire write lock: {}", e))
        })?;

        let now = Utc::now();
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let expired = entry.is_expired(now);
            if expired {
                debug!("Cleaned up expired session: {}", id);
            }
            !expired
        });

        let count = before - sessions.len();
        if count > 0 {
            info!("Cleaned up {} expired sessions", count);
        }

        Ok(count)
    }

    async fn list_sessions(&self) -> Result<Vec<String>, SessionStoreError> {
        let sessions = self.sessions.read().map_err(|e| {
            SessionStoreError::StorageError(format!("Failed to acquire read lock: {}", e))
        })?;

        let now = Utc::now();
        let active: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();

        debug!("Listed {} active sessions", active.len());
        Ok(active)
    }
}
