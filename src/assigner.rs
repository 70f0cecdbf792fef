// src/assigner.rs

use crate::error::{AppError, PoolExhaustedReason, Result};
use crate::health::TokenHealthChecker;
use crate::session::Session;
use crate::storage::{CommitOutcome, UserStore};
use crate::token::Token;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// What the assigner should do with a shared token that failed its health
/// check. Marking it expired in the store is deliberately switched off;
/// swap the strategy to re-enable that behavior.
#[async_trait]
pub trait UnhealthyTokenPolicy: Send + Sync {
    async fn on_unhealthy(&self, token: &Token);
}

/// The shipped no-op strategy: the failing token stays untouched in the
/// pool and simply gets skipped by this scan.
pub struct LeaveUntouched;

#[async_trait]
impl UnhealthyTokenPolicy for LeaveUntouched {
    async fn on_unhealthy(&self, token: &Token) {
        warn!(
            token.preview = %token.suffix(),
            "Token failed health check. Skipping token."
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentPhase {
    Idle,
    Scanning,
    Assigning,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    pub current: usize,
    pub total: usize,
}

/// Observable state of the assignment flow. Mutated only by the assigner;
/// callers read clones for progress display.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentState {
    pub phase: AssignmentPhase,
    pub scan_progress: ScanProgress,
    pub last_error: Option<String>,
}

impl Default for AssignmentState {
    fn default() -> Self {
        Self {
            phase: AssignmentPhase::Idle,
            scan_progress: ScanProgress::default(),
            last_error: None,
        }
    }
}

/// Result of a `start()` call that did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// A healthy token was committed as the user's personal token.
    Assigned(Token),
    /// Another assignment flow is already running for this user; nothing
    /// was started and the running flow's progress is untouched.
    Busy,
}

/// Finds and commits a personal token for the session's user.
///
/// A guarded, resumable flow: Idle → Scanning → Assigning → Success|Error,
/// with commit conflicts looping back to Scanning on the next candidate.
/// At most one flow runs per assigner; a concurrent `start()` reports
/// `Busy` instead of interleaving scans against the shared pool.
pub struct TokenAssigner {
    session: Arc<Session>,
    store: Arc<dyn UserStore>,
    checker: TokenHealthChecker,
    expiry_policy: Arc<dyn UnhealthyTokenPolicy>,
    state: RwLock<AssignmentState>,
    flight: Mutex<()>,
    rng: std::sync::Mutex<StdRng>,
}

impl TokenAssigner {
    pub fn new(
        session: Arc<Session>,
        store: Arc<dyn UserStore>,
        checker: TokenHealthChecker,
    ) -> Self {
        Self::with_rng(session, store, checker, StdRng::from_entropy())
    }

    /// Deterministic variant: tests seed the RNG so scan order is
    /// reproducible.
    pub fn with_rng(
        session: Arc<Session>,
        store: Arc<dyn UserStore>,
        checker: TokenHealthChecker,
        rng: StdRng,
    ) -> Self {
        Self {
            session,
            store,
            checker,
            expiry_policy: Arc::new(LeaveUntouched),
            state: RwLock::new(AssignmentState::default()),
            flight: Mutex::new(()),
            rng: std::sync::Mutex::new(rng),
        }
    }

    pub fn with_expiry_policy(mut self, policy: Arc<dyn UnhealthyTokenPolicy>) -> Self {
        self.expiry_policy = policy;
        self
    }

    pub async fn state(&self) -> AssignmentState {
        self.state.read().await.clone()
    }

    /// Runs the scan → health-check → commit flow to completion.
    pub async fn start(&self) -> Result<StartOutcome> {
        self.run(CancellationToken::new()).await
    }

    /// Like `start()`, but the caller can abandon the scan between
    /// candidates.
    pub async fn start_cancellable(&self, cancel: CancellationToken) -> Result<StartOutcome> {
        self.run(cancel).await
    }

    /// Resets progress and re-runs the flow. Safe to call repeatedly from
    /// an error state.
    pub async fn retry(&self) -> Result<StartOutcome> {
        {
            let mut state = self.state.write().await;
            state.scan_progress = ScanProgress::default();
            state.last_error = None;
        }
        self.start().await
    }

    #[instrument(level = "info", skip_all, fields(user = %self.session.username))]
    async fn run(&self, cancel: CancellationToken) -> Result<StartOutcome> {
        // Single-flight guard. The mutex replaces the old boolean
        // re-entrancy flag so the exclusion also holds across threads.
        let _guard = match self.flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("Assignment flow already running; reporting busy");
                return Ok(StartOutcome::Busy);
            }
        };

        info!("Starting token auto-assignment");
        self.transition(AssignmentPhase::Scanning, ScanProgress::default(), None)
            .await;

        let snapshot = self.session.pool().snapshot().await;
        if snapshot.is_empty() {
            return self
                .fail(AppError::PoolExhausted {
                    reason: PoolExhaustedReason::NoTokensConfigured,
                })
                .await;
        }

        // Uniform shuffle of a copy spreads sessions across the pool
        // instead of draining it front-to-back.
        let mut candidates = snapshot.tokens.clone();
        {
            let mut rng = self.rng.lock().expect("assigner rng lock poisoned");
            candidates.shuffle(&mut *rng);
        }
        let total = candidates.len();

        for (index, candidate) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return self
                    .fail(AppError::Interrupted("assignment cancelled".to_string()))
                    .await;
            }

            self.transition(
                AssignmentPhase::Scanning,
                ScanProgress {
                    current: index + 1,
                    total,
                },
                None,
            )
            .await;
            info!(
                token.preview = %candidate.suffix(),
                progress.current = index + 1,
                progress.total = total,
                "Testing shared token"
            );

            let (_reports, healthy) = self.checker.check_token(candidate).await;
            if !healthy {
                self.expiry_policy.on_unhealthy(candidate).await;
                continue;
            }

            self.transition(
                AssignmentPhase::Assigning,
                ScanProgress {
                    current: index + 1,
                    total,
                },
                None,
            )
            .await;

            match self
                .store
                .commit_personal_token(&self.session.user_id, candidate)
                .await
            {
                Ok(CommitOutcome::Committed) => {
                    self.session.set_personal_token(candidate.clone()).await;
                    self.transition(
                        AssignmentPhase::Success,
                        ScanProgress {
                            current: index + 1,
                            total,
                        },
                        None,
                    )
                    .await;
                    info!(
                        token.preview = %candidate.suffix(),
                        "Successfully assigned personal token"
                    );
                    return Ok(StartOutcome::Assigned(candidate.clone()));
                }
                Ok(CommitOutcome::Conflict { reason }) => {
                    // Benign race: another session won this token. Back to
                    // scanning with the next candidate.
                    warn!(
                        token.preview = %candidate.suffix(),
                        reason = %reason,
                        "Could not assign token. Trying next."
                    );
                    continue;
                }
                Err(e) => {
                    // Structural failure repeats for every candidate, so
                    // scanning stops here.
                    return self.fail(e).await;
                }
            }
        }

        self.fail(AppError::PoolExhausted {
            reason: PoolExhaustedReason::NoneHealthy,
        })
        .await
    }

    async fn transition(
        &self,
        phase: AssignmentPhase,
        scan_progress: ScanProgress,
        last_error: Option<String>,
    ) {
        let mut state = self.state.write().await;
        state.phase = phase;
        state.scan_progress = scan_progress;
        state.last_error = last_error;
    }

    async fn fail(&self, error: AppError) -> Result<StartOutcome> {
        warn!(error = %error, "Token assignment failed");
        let mut state = self.state.write().await;
        state.phase = AssignmentPhase::Error;
        state.last_error = Some(error.user_message());
        drop(state);
        Err(error)
    }
}
