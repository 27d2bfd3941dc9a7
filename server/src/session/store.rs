use std::error::Error;
use std::fmt::{Debug, Display};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::conversation::ConversationState;

/// Error type for session store operations
#[derive(Debug)]
pub enum SessionStoreError {
    /// Session not found
    NotFound(String),
    /// Error occurred during a store operation
    StorageError(String),
}

impl Display for SessionStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStoreError::NotFound(id) => write!(f, "Session not found: {}", id),
            SessionStoreError::StorageError(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl Error for SessionStoreError {}

/// One-shot status shown under the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The last submission failed remotely
    Error(String),
    /// The conversation was just cleared
    Cleared,
}

/// Session data structure
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session identifier
    pub id: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Last time the session was modified
    pub updated_at: DateTime<Utc>,
    /// History and continuation token
    pub conversation: ConversationState,
    /// Latest error or status for the page
    pub notice: Option<Notice>,
}

impl Session {
    /// Create a new session with the given ID
    pub fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            conversation: ConversationState::new(),
            notice: None,
        }
    }

    /// Mark the session as modified
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Remember a failed submission so it can be shown inline
    pub fn record_error(&mut self, message: String) {
        self.notice = Some(Notice::Error(message));
        self.touch();
    }

    /// Reset the conversation and leave a "cleared" notice
    pub fn clear(&mut self) {
        self.conversation.reset();
        self.notice = Some(Notice::Cleared);
        self.touch();
    }
}

/// A session shared between requests.
///
/// The async mutex doubles as the busy flag: a request holds the guard for
/// the whole turn, and a competing submission that fails `try_lock` is
/// rejected.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Trait defining the interface for session stores
#[async_trait]
pub trait SessionStore: Send + Sync + Debug {
    /// Create a new session with the given ID
    async fn create_session(&self, id: String) -> Result<SessionHandle, SessionStoreError>;

    /// Get a live session by ID, extending its lifetime
    async fn get_session(&self, id: &str) -> Result<SessionHandle, SessionStoreError>;

    /// Delete a session by ID
    async fn delete_session(&self, id: &str) -> Result<(), SessionStoreError>;

    /// Delete expired sessions
    async fn cleanup_expired_sessions(&self) -> Result<usize, SessionStoreError>;

    /// List the IDs of all active (non-expired) sessions
    async fn list_sessions(&self) -> Result<Vec<String>, SessionStoreError>;
}

/// Type alias for Arc-wrapped SessionStore trait objects
pub type SessionStoreRef = Arc<dyn SessionStore>;
