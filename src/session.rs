// src/session.rs

use crate::pool::CredentialPool;
use crate::storage::UserStore;
use crate::token::Token;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Everything scoped to one logged-in user session.
///
/// Created at login, dropped at logout. Replaces the ambient
/// process-global cache the broker previously relied on: the pool snapshot,
/// master key, and the user's personal-token handle all live here and die
/// with the session.
pub struct Session {
    pub user_id: String,
    pub username: String,
    pub started_at: DateTime<Utc>,
    pool: CredentialPool,
    personal_token: RwLock<Option<Token>>,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        store: Arc<dyn UserStore>,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            user_id: user_id.into(),
            username: username.into(),
            started_at: Utc::now(),
            pool: CredentialPool::new(store),
            personal_token: RwLock::new(None),
        });
        info!(user = %session.username, "Session started");
        session
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    pub async fn personal_token(&self) -> Option<Token> {
        self.personal_token.read().await.clone()
    }

    /// Records the committed token locally. The store association was
    /// already written by the assigner; this is the session-side handle.
    pub async fn set_personal_token(&self, token: Token) {
        info!(token.preview = %token.suffix(), "Personal token set for session");
        *self.personal_token.write().await = Some(token);
    }

    /// Drops the session-side handle. The token stays in the shared pool and
    /// the cached snapshot is left as-is.
    pub async fn clear_personal_token(&self) {
        *self.personal_token.write().await = None;
    }

    /// Logout teardown: forget the personal token and the cached pool data.
    pub async fn end(&self) {
        self.clear_personal_token().await;
        self.pool.invalidate().await;
        info!(user = %self.username, "Session ended");
    }
}
