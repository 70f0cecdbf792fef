// src/executor.rs

use crate::audit::{AuditSink, CallOutcome, CallRecord};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::events::{AppEvent, EventBus};
use crate::session::Session;
use crate::token::Token;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Which admission tier a call belongs to. Only `Generation` is metered;
/// status polling and asset uploads bypass the slot gate entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Generation,
    Status,
    Upload,
}

/// Caller-supplied tag and class for one proxied call. The tag ends up in
/// audit records and error messages, so it should name the operation
/// (`"VEO T2V GENERATE"`, `"VEO STATUS"`, ...).
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tag: String,
    pub class: RequestClass,
}

impl RequestContext {
    pub fn new(tag: impl Into<String>, class: RequestClass) -> Self {
        Self {
            tag: tag.into(),
            class,
        }
    }
}

/// Successful call: the response payload plus the token that carried it.
#[derive(Debug)]
pub struct Execution {
    pub data: Value,
    pub token_used: Token,
}

/// Performs one authenticated call against a backend endpoint.
///
/// Token resolution order: explicit override, then the session's personal
/// token, then a hard `TokenMissing` failure. There is no silent fallback
/// to the master key. The executor classifies outcomes and signals
/// failures; it never retries.
pub struct RequestExecutor {
    client: reqwest::Client,
    session: Arc<Session>,
    identity_header: String,
    audit: Arc<dyn AuditSink>,
    events: EventBus,
}

impl RequestExecutor {
    pub fn new(
        session: Arc<Session>,
        config: &AppConfig,
        audit: Arc<dyn AuditSink>,
        events: EventBus,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.backends.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            session,
            identity_header: config.identity_header.clone(),
            audit,
            events,
        }
    }

    #[instrument(level = "debug", skip_all, fields(call.context = %ctx.tag, endpoint = %endpoint))]
    pub async fn execute(
        &self,
        endpoint: Url,
        body: &Value,
        ctx: &RequestContext,
        token_override: Option<&Token>,
    ) -> Result<Execution> {
        let (token, is_personal) = match token_override {
            Some(token) => (token.clone(), false),
            None => match self.session.personal_token().await {
                Some(token) => (token, true),
                None => return Err(AppError::TokenMissing(ctx.tag.clone())),
            },
        };

        debug!(
            token.preview = %token.suffix(),
            personal = is_personal,
            "Dispatching proxied call"
        );

        let result = self.send(endpoint.clone(), body, &token).await;

        match result {
            Ok(data) => {
                self.record(ctx, &token, endpoint.as_str(), CallOutcome::Success, None);
                Ok(Execution {
                    data,
                    token_used: token,
                })
            }
            Err(e) => {
                warn!(
                    call.context = %ctx.tag,
                    token.preview = %token.suffix(),
                    error = %e,
                    "Proxied call failed"
                );
                self.record(
                    ctx,
                    &token,
                    endpoint.as_str(),
                    CallOutcome::Error,
                    Some(e.to_string()),
                );
                if is_personal && ctx.class == RequestClass::Generation {
                    self.events.publish(AppEvent::PersonalTokenFailed {
                        user_id: self.session.user_id.clone(),
                    });
                }
                Err(e)
            }
        }
    }

    async fn send(&self, endpoint: Url, body: &Value, token: &Token) -> Result<Value> {
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(token.expose())
            .header(self.identity_header.as_str(), self.session.username.as_str())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let data: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(AppError::RequestFailure {
                status: status.as_u16(),
                message: extract_error_message(&data, status.as_u16()),
            });
        }
        Ok(data)
    }

    fn record(
        &self,
        ctx: &RequestContext,
        token: &Token,
        endpoint: &str,
        outcome: CallOutcome,
        detail: Option<String>,
    ) {
        self.audit.record(CallRecord {
            context: ctx.tag.clone(),
            token_suffix: token.suffix(),
            endpoint: endpoint.to_string(),
            outcome,
            detail,
            at: Utc::now(),
        });
    }
}

/// Best-available human-readable message from an error body: the nested
/// `error.message`, a top-level `message`, or a generic fallback.
pub(crate) fn extract_error_message(data: &Value, status: u16) -> String {
    data.get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .or_else(|| data.get("message").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("API call failed ({status})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_nested_error_message() {
        let body = json!({"error": {"message": "rate limited"}});
        assert_eq!(extract_error_message(&body, 429), "rate limited");
    }

    #[test]
    fn extracts_flat_message() {
        let body = json!({"message": "quota exceeded"});
        assert_eq!(extract_error_message(&body, 403), "quota exceeded");
    }

    #[test]
    fn falls_back_to_generic_message() {
        assert_eq!(
            extract_error_message(&Value::Null, 500),
            "API call failed (500)"
        );
        assert_eq!(
            extract_error_message(&json!({"error": 42}), 502),
            "API call failed (502)"
        );
    }
}
