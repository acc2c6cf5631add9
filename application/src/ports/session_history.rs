//! Session history port.
//!
//! The backend is the source of truth for resumable state. After a resume,
//! the engine asks this store for the prior messages of the session and
//! rebuilds its transcript from them.

use crate::error::ConnectionError;
use async_trait::async_trait;
use harness_domain::{Message, SessionId};

/// Port for fetching a session's prior messages.
#[async_trait]
pub trait SessionHistoryStore: Send + Sync {
    /// Ordered message history of `session_id`.
    ///
    /// Returns [`ConnectionError::SessionNotFound`] when the backend has no
    /// such session.
    async fn fetch_history(&self, session_id: &SessionId) -> Result<Vec<Message>, ConnectionError>;
}
