// src/pool.rs

use crate::storage::UserStore;
use crate::token::Token;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Value-object view of the shared pool at one point in time. Scanning works
/// on a shuffled *copy*; the snapshot itself is never mutated.
#[derive(Debug, Clone, Default)]
pub struct PoolSnapshot {
    pub tokens: Vec<Token>,
    pub master_key: Option<Token>,
}

impl PoolSnapshot {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }
}

/// Read-only, session-cached view over the shared token list and master key.
///
/// The first `snapshot()` call hits the store; later calls serve the cached
/// copy until `invalidate()`. A store failure yields an empty snapshot so
/// dependent operations fail fast instead of hanging.
pub struct CredentialPool {
    store: Arc<dyn UserStore>,
    cached: RwLock<Option<PoolSnapshot>>,
}

impl CredentialPool {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self {
            store,
            cached: RwLock::new(None),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn snapshot(&self) -> PoolSnapshot {
        if let Some(snapshot) = self.cached.read().await.as_ref() {
            debug!(tokens = snapshot.len(), "Serving cached pool snapshot");
            return snapshot.clone();
        }

        let mut guard = self.cached.write().await;
        // Another task may have filled the cache while we waited.
        if let Some(snapshot) = guard.as_ref() {
            return snapshot.clone();
        }

        let tokens = match self.store.shared_tokens().await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Failed to fetch shared tokens; pool treated as empty");
                Vec::new()
            }
        };
        let master_key = match self.store.master_key().await {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Failed to fetch master key");
                None
            }
        };

        if let Some(master) = master_key.as_ref() {
            info!(master.preview = %master.suffix(), "Shared master key loaded for session");
        }
        info!(tokens = tokens.len(), "Shared tokens loaded for session");

        let snapshot = PoolSnapshot { tokens, master_key };
        *guard = Some(snapshot.clone());
        snapshot
    }

    /// Drops the cached snapshot. Called on logout.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}
