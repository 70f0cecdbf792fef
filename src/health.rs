// src/health.rs

use crate::token::Token;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// One smoke check of a candidate token against a single service.
///
/// Probe internals (which endpoint, which model) belong to the service
/// integration, not to this core; the checker only sequences probes and
/// aggregates verdicts.
#[async_trait]
pub trait ServiceProbe: Send + Sync {
    fn service(&self) -> &str;

    /// A failing required service fails the whole token.
    fn required(&self) -> bool {
        true
    }

    /// `Ok` with a human-readable note on success, `Err` with the failure
    /// message otherwise.
    async fn probe(&self, token: &Token) -> std::result::Result<String, String>;
}

/// Per-service verdict for one token.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub service: String,
    pub success: bool,
    pub message: String,
}

/// Runs the probe battery against one candidate token.
///
/// Probes run sequentially, never in parallel: the candidate is a shared,
/// rate-limited credential and a burst of simultaneous calls against it can
/// itself trip the limiter and produce a false negative.
pub struct TokenHealthChecker {
    probes: Vec<Arc<dyn ServiceProbe>>,
}

impl TokenHealthChecker {
    pub fn new(probes: Vec<Arc<dyn ServiceProbe>>) -> Self {
        Self { probes }
    }

    #[instrument(level = "debug", skip(self, token), fields(token.preview = %token.suffix()))]
    pub async fn check(&self, token: &Token) -> Vec<ProbeReport> {
        let mut reports = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            let report = match probe.probe(token).await {
                Ok(message) => ProbeReport {
                    service: probe.service().to_string(),
                    success: true,
                    message,
                },
                Err(message) => {
                    warn!(
                        service = probe.service(),
                        token.preview = %token.suffix(),
                        message = %message,
                        "Service probe failed"
                    );
                    ProbeReport {
                        service: probe.service().to_string(),
                        success: false,
                        message,
                    }
                }
            };
            reports.push(report);
        }
        reports
    }

    /// A token is healthy iff every *required* service passed.
    pub fn is_healthy(&self, reports: &[ProbeReport]) -> bool {
        self.probes.iter().filter(|p| p.required()).all(|probe| {
            reports
                .iter()
                .any(|r| r.service == probe.service() && r.success)
        })
    }

    pub async fn check_token(&self, token: &Token) -> (Vec<ProbeReport>, bool) {
        let reports = self.check(token).await;
        let healthy = self.is_healthy(&reports);
        debug!(token.preview = %token.suffix(), healthy, "Token health verdict");
        (reports, healthy)
    }
}

/// HTTP-backed probe: POSTs a minimal status body to the service endpoint
/// with the candidate token and treats any 2xx as a pass.
pub struct EndpointProbe {
    service: String,
    endpoint: Url,
    client: reqwest::Client,
}

impl EndpointProbe {
    pub fn new(service: impl Into<String>, endpoint: Url, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            service: service.into(),
            endpoint,
            client,
        }
    }
}

#[async_trait]
impl ServiceProbe for EndpointProbe {
    fn service(&self) -> &str {
        &self.service
    }

    async fn probe(&self, token: &Token) -> std::result::Result<String, String> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(token.expose())
            .json(&serde_json::json!({ "operations": [] }))
            .send()
            .await
            .map_err(|e| format!("probe request failed: {e}"))?;

        let status = response.status();
        if status.is_success() {
            Ok(format!("{} reachable", self.service))
        } else {
            Err(format!("{} returned {}", self.service, status.as_u16()))
        }
    }
}
