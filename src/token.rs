// src/token.rs

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

/// Where a token came from: the shared pool, or an exclusive personal grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenOrigin {
    Shared,
    Personal,
}

/// Last status the store recorded for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    Expired,
}

/// A credential for the generative-media backends. Immutable once issued;
/// only its association to a user ever changes, and that lives in the store.
///
/// Not `Serialize`: a token value must never end up in a log line or a
/// persisted blob. `secrecy` enforces that at the type level.
#[derive(Debug, Clone, Deserialize)]
pub struct Token {
    pub value: Secret<String>,
    pub created_at: DateTime<Utc>,
    pub origin: TokenOrigin,
    pub last_known_status: TokenStatus,
}

impl Token {
    pub fn shared(value: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            value: Secret::new(value.into()),
            created_at,
            origin: TokenOrigin::Shared,
            last_known_status: TokenStatus::Active,
        }
    }

    pub fn personal(value: impl Into<String>) -> Self {
        Self {
            value: Secret::new(value.into()),
            created_at: Utc::now(),
            origin: TokenOrigin::Personal,
            last_known_status: TokenStatus::Active,
        }
    }

    /// Truncated form for logs and audit records. The full value must never
    /// appear anywhere except the `Authorization` header.
    pub fn suffix(&self) -> String {
        preview(self.value.expose_secret())
    }

    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.value.expose_secret() == other.value.expose_secret()
    }
}

/// Last six characters of a credential, `...` prefixed.
pub fn preview(value: &str) -> String {
    if value.len() > 6 {
        format!("...{}", &value[value.len() - 6..])
    } else {
        value.to_string()
    }
}
