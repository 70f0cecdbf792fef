// src/lib.rs

pub mod admission;
pub mod assigner;
pub mod audit;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod gateway;
pub mod health;
pub mod pool;
pub mod session;
pub mod storage;
pub mod token;

use crate::admission::AdmissionController;
use crate::executor::RequestExecutor;
use crate::gateway::GenerationGateway;
use crate::storage::{SlotGate, UserStore};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

pub use config::AppConfig;
pub use error::{AppError, PoolExhaustedReason, Result};
pub use session::Session;
pub use token::Token;

/// Initializes structured logging for host binaries. `RUST_LOG` overrides
/// the default `info` filter. Call once at startup.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();
}

/// Wires the per-session object graph: session context, health-checked
/// token assignment, and the admission-gated gateway to the video backend.
pub struct Broker {
    pub session: Arc<Session>,
    pub assigner: assigner::TokenAssigner,
    pub gateway: GenerationGateway,
    pub events: events::EventBus,
}

impl Broker {
    /// Builds a broker for one logged-in user. `store` and `gate` are the
    /// externally owned user/token store and slot primitive.
    pub fn new(
        config: &AppConfig,
        user_id: impl Into<String>,
        username: impl Into<String>,
        store: Arc<dyn UserStore>,
        gate: Arc<dyn SlotGate>,
        checker: health::TokenHealthChecker,
    ) -> Result<Self> {
        let session = Session::new(user_id, username, store.clone());
        let events = events::EventBus::default();
        let audit: Arc<dyn audit::AuditSink> = Arc::new(audit::TracingAuditSink);

        let executor = RequestExecutor::new(session.clone(), config, audit, events.clone());
        let admission = AdmissionController::new(gate, config.admission.clone());
        let video_base = Url::parse(&config.backends.video_url)?;
        let gateway = GenerationGateway::new(admission, executor, video_base);
        let assigner = assigner::TokenAssigner::new(session.clone(), store, checker);

        info!(user = %session.username, "Broker initialized");
        Ok(Self {
            session,
            assigner,
            gateway,
            events,
        })
    }
}
