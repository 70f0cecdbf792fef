//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use token_broker::assigner::TokenAssigner;
use token_broker::health::{ServiceProbe, TokenHealthChecker};
use token_broker::session::Session;
use token_broker::storage::{InMemoryStore, UserStore};
use token_broker::token::Token;
use tokio::sync::watch;

pub fn shared_token(value: &str) -> Token {
    Token::shared(value, Utc::now())
}

pub fn shared_tokens(values: &[&str]) -> Vec<Token> {
    values.iter().map(|v| shared_token(v)).collect()
}

/// Probe that passes only for an allow-listed set of token values, counting
/// every invocation.
pub struct AllowListProbe {
    service: &'static str,
    healthy_values: HashSet<String>,
    calls: Arc<AtomicUsize>,
}

impl AllowListProbe {
    pub fn new(service: &'static str, healthy_values: &[&str], calls: Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self {
            service,
            healthy_values: healthy_values.iter().map(|v| v.to_string()).collect(),
            calls,
        })
    }
}

#[async_trait]
impl ServiceProbe for AllowListProbe {
    fn service(&self) -> &str {
        self.service
    }

    async fn probe(&self, token: &Token) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy_values.contains(token.expose()) {
            Ok("ok".to_string())
        } else {
            Err("unavailable".to_string())
        }
    }
}

/// Two-service battery (image + video) that passes only the allow-listed
/// token values. Returns the checker and a shared probe-invocation counter.
pub fn checker_passing_only(values: &[&str]) -> (TokenHealthChecker, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let checker = TokenHealthChecker::new(vec![
        AllowListProbe::new("Imagen", values, calls.clone()),
        AllowListProbe::new("Veo", values, calls.clone()),
    ]);
    (checker, calls)
}

/// Probe that blocks until released, then passes. Lets a test hold an
/// assignment flow mid-scan.
pub struct BlockingProbe {
    release_rx: watch::Receiver<bool>,
}

pub struct ProbeRelease {
    release_tx: watch::Sender<bool>,
}

impl ProbeRelease {
    pub fn release(&self) {
        let _ = self.release_tx.send(true);
    }
}

impl BlockingProbe {
    pub fn new() -> (Arc<Self>, ProbeRelease) {
        let (release_tx, release_rx) = watch::channel(false);
        (
            Arc::new(Self { release_rx }),
            ProbeRelease { release_tx },
        )
    }
}

#[async_trait]
impl ServiceProbe for BlockingProbe {
    fn service(&self) -> &str {
        "Veo"
    }

    async fn probe(&self, _token: &Token) -> Result<String, String> {
        let mut rx = self.release_rx.clone();
        while !*rx.borrow() {
            rx.changed().await.map_err(|_| "release dropped".to_string())?;
        }
        Ok("ok".to_string())
    }
}

/// Session + deterministic assigner over the given store and checker.
pub fn assigner_for(
    store: Arc<InMemoryStore>,
    checker: TokenHealthChecker,
    seed: u64,
) -> (Arc<Session>, Arc<TokenAssigner>) {
    let session = Session::new("u1", "alice", store.clone() as Arc<dyn UserStore>);
    let assigner = Arc::new(TokenAssigner::with_rng(
        session.clone(),
        store,
        checker,
        StdRng::seed_from_u64(seed),
    ));
    (session, assigner)
}
