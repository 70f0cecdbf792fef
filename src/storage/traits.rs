// src/storage/traits.rs

use crate::error::Result;
use crate::token::Token;
use async_trait::async_trait;

/// Result of trying to persist a token-to-user association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The association was written; the token is now exclusively this user's.
    Committed,
    /// Another session holds this token. Benign; the caller moves on to the
    /// next candidate.
    Conflict { reason: String },
}

/// Contract against the external user/token store.
///
/// The store owns the data; this core only reads tokens and writes the
/// association between a token and a user. Every mutation may race with
/// other sessions, so callers must act on the returned outcome, never on
/// local intent.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Ordered list of shared tokens available for assignment.
    async fn shared_tokens(&self) -> Result<Vec<Token>>;

    /// The single always-shared master key, if one is configured.
    async fn master_key(&self) -> Result<Option<Token>>;

    /// Atomically associate `token` with `user_id`.
    ///
    /// Benign contention is an `Ok(CommitOutcome::Conflict)`; a structural
    /// defect (e.g. a missing column) is `Err(AppError::SchemaFailure)` and
    /// will repeat for every candidate.
    async fn commit_personal_token(&self, user_id: &str, token: &Token) -> Result<CommitOutcome>;

    /// Drop the user's personal-token association. The token itself stays in
    /// the shared pool.
    async fn clear_personal_token(&self, user_id: &str) -> Result<()>;
}

/// Contract against the external atomic slot primitive.
#[async_trait]
pub trait SlotGate: Send + Sync {
    /// One attempt to claim a generation slot on `server_url`.
    ///
    /// `Ok(false)` is a capacity denial and safe to retry; `Err` is a
    /// storage failure and must propagate.
    async fn try_acquire(&self, server_url: &str, cooldown_seconds: u32) -> Result<bool>;
}
