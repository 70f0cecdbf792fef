// src/storage/memory.rs

use crate::error::{AppError, Result};
use crate::storage::{CommitOutcome, SlotGate, UserStore};
use crate::token::Token;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

/// In-memory implementation of the user/token store, for tests and local
/// development. Failure modes (commit conflicts, schema breakage, fetch
/// errors) are programmable so callers can exercise every path.
#[derive(Default)]
pub struct InMemoryStore {
    shared: RwLock<Vec<Token>>,
    master: RwLock<Option<Token>>,
    assignments: RwLock<HashMap<String, Token>>,
    claimed: RwLock<HashSet<String>>,
    schema_broken: RwLock<bool>,
    fetch_error: RwLock<Option<String>>,
    shared_fetches: AtomicUsize,
}

impl InMemoryStore {
    pub fn new(shared: Vec<Token>, master: Option<Token>) -> Self {
        Self {
            shared: RwLock::new(shared),
            master: RwLock::new(master),
            ..Default::default()
        }
    }

    /// Marks a token value as already held by another session, so the next
    /// commit of it reports a conflict.
    pub async fn claim_elsewhere(&self, token_value: &str) {
        self.claimed.write().await.insert(token_value.to_string());
    }

    /// Makes every commit fail structurally, the way a missing column does.
    pub async fn break_schema(&self) {
        *self.schema_broken.write().await = true;
    }

    /// Makes every pool fetch fail with a storage error.
    pub async fn fail_fetches(&self, reason: impl Into<String>) {
        *self.fetch_error.write().await = Some(reason.into());
    }

    pub async fn personal_token(&self, user_id: &str) -> Option<Token> {
        self.assignments.read().await.get(user_id).cloned()
    }

    /// How many times `shared_tokens` hit the store. Lets tests assert the
    /// session cache actually caches.
    pub fn shared_fetch_count(&self) -> usize {
        self.shared_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn shared_tokens(&self) -> Result<Vec<Token>> {
        self.shared_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.fetch_error.read().await.clone() {
            return Err(AppError::Storage(reason));
        }
        trace!("InMemoryStore::shared_tokens");
        Ok(self.shared.read().await.clone())
    }

    async fn master_key(&self) -> Result<Option<Token>> {
        if let Some(reason) = self.fetch_error.read().await.clone() {
            return Err(AppError::Storage(reason));
        }
        Ok(self.master.read().await.clone())
    }

    async fn commit_personal_token(&self, user_id: &str, token: &Token) -> Result<CommitOutcome> {
        if *self.schema_broken.read().await {
            return Err(AppError::SchemaFailure(
                "missing column personal_auth_token".to_string(),
            ));
        }

        let value = token.value.expose_secret().clone();
        let mut claimed = self.claimed.write().await;
        if claimed.contains(&value) {
            return Ok(CommitOutcome::Conflict {
                reason: format!("token {} already assigned", token.suffix()),
            });
        }
        claimed.insert(value);
        drop(claimed);

        self.assignments
            .write()
            .await
            .insert(user_id.to_string(), token.clone());
        Ok(CommitOutcome::Committed)
    }

    async fn clear_personal_token(&self, user_id: &str) -> Result<()> {
        if let Some(token) = self.assignments.write().await.remove(user_id) {
            self.claimed
                .write()
                .await
                .remove(token.value.expose_secret());
        }
        Ok(())
    }
}

/// In-memory slot gate with a scripted grant/deny sequence. Once the script
/// is exhausted every call grants, which is also the default.
#[derive(Default)]
pub struct InMemoryGate {
    script: RwLock<VecDeque<ScriptedResponse>>,
    calls: AtomicUsize,
}

enum ScriptedResponse {
    Grant,
    Deny,
    Fail(String),
}

impl InMemoryGate {
    pub fn always_grant() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deny `n` times, then grant.
    pub async fn deny_times(n: usize) -> Arc<Self> {
        let gate = Self::default();
        {
            let mut script = gate.script.write().await;
            for _ in 0..n {
                script.push_back(ScriptedResponse::Deny);
            }
            script.push_back(ScriptedResponse::Grant);
        }
        Arc::new(gate)
    }

    pub async fn fail_with(reason: impl Into<String>) -> Arc<Self> {
        let gate = Self::default();
        gate.script
            .write()
            .await
            .push_back(ScriptedResponse::Fail(reason.into()));
        Arc::new(gate)
    }

    /// Deny forever. For cancellation and timeout tests.
    pub fn never_grant() -> Arc<NeverGrantGate> {
        Arc::new(NeverGrantGate::default())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SlotGate for InMemoryGate {
    async fn try_acquire(&self, _server_url: &str, _cooldown_seconds: u32) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.write().await.pop_front() {
            None | Some(ScriptedResponse::Grant) => Ok(true),
            Some(ScriptedResponse::Deny) => Ok(false),
            Some(ScriptedResponse::Fail(reason)) => Err(AppError::Storage(reason)),
        }
    }
}

#[derive(Default)]
pub struct NeverGrantGate {
    calls: AtomicUsize,
}

impl NeverGrantGate {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SlotGate for NeverGrantGate {
    async fn try_acquire(&self, _server_url: &str, _cooldown_seconds: u32) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }
}
