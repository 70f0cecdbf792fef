// src/error.rs

use thiserror::Error;
use tracing::error;

/// Distinguishes the two ways a token scan can come up empty, so the
/// user-facing message can say which one happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolExhaustedReason {
    /// The store returned no shared tokens at all.
    NoTokensConfigured,
    /// Tokens existed, but none passed the health check (or every healthy
    /// one was claimed by another session first).
    NoneHealthy,
}

/// Represents possible errors that can occur in the broker.
///
/// Transient slot denials are deliberately absent: they are absorbed inside
/// the admission loop and never surface as errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Reqwest HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    YamlParsing(#[from] serde_yaml::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Token pool exhausted")]
    PoolExhausted { reason: PoolExhaustedReason },

    #[error("Storage schema failure: {0}")]
    SchemaFailure(String),

    #[error("Personal auth token required but none is set: {0}")]
    TokenMissing(String),

    #[error("API call failed ({status}): {message}")]
    RequestFailure { status: u16, message: String },

    #[error("Operation interrupted: {0}")]
    Interrupted(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Message suitable for showing to the end user. Internal detail stays
    /// in the log entry, not in the returned string.
    pub fn user_message(&self) -> String {
        match self {
            Self::PoolExhausted { reason } => match reason {
                PoolExhaustedReason::NoTokensConfigured => {
                    "System could not find any available connection tokens. Please contact the admin.".to_string()
                }
                PoolExhaustedReason::NoneHealthy => {
                    "All connection slots are currently full. Please try again in a moment or contact the admin.".to_string()
                }
            },
            Self::SchemaFailure(detail) => {
                error!(detail = %detail, "Storage schema failure surfaced to user");
                "Database schema is outdated. Please notify an administrator.".to_string()
            }
            Self::TokenMissing(context) => format!(
                "Personal Auth Token is required for {context}, but none was found. Please re-login or check your account."
            ),
            Self::RequestFailure { message, .. } => message.clone(),
            Self::Interrupted(_) => {
                "The operation was cancelled before it could complete.".to_string()
            }
            Self::Storage(detail) => {
                format!("Database error while requesting a generation slot: {detail}")
            }
            _ => "An unexpected internal error occurred. Please try again.".to_string(),
        }
    }

    /// True for failures that a user retry can plausibly fix.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted { .. } | Self::RequestFailure { .. } | Self::Interrupted(_)
        )
    }
}

// Optional: Define a type alias for Result using the AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhausted_messages_are_distinct() {
        let none_configured = AppError::PoolExhausted {
            reason: PoolExhaustedReason::NoTokensConfigured,
        };
        let none_healthy = AppError::PoolExhausted {
            reason: PoolExhaustedReason::NoneHealthy,
        };
        assert_ne!(none_configured.user_message(), none_healthy.user_message());
        assert!(none_configured.user_message().contains("contact the admin"));
    }

    #[test]
    fn request_failure_message_passes_through() {
        let err = AppError::RequestFailure {
            status: 429,
            message: "rate limited".to_string(),
        };
        assert_eq!(err.user_message(), "rate limited");
    }

    #[test]
    fn schema_failure_is_not_retryable() {
        assert!(!AppError::SchemaFailure("missing column".to_string()).is_retryable());
        assert!(AppError::PoolExhausted {
            reason: PoolExhaustedReason::NoneHealthy
        }
        .is_retryable());
    }

    #[test]
    fn token_missing_names_the_context() {
        let err = AppError::TokenMissing("VEO T2V GENERATE".to_string());
        assert!(err.user_message().contains("VEO T2V GENERATE"));
        assert!(err.user_message().contains("re-login"));
    }
}
