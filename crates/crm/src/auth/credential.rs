//! Access credential and its persisted form

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TokenGrant;
use crate::error::{CrmError, Result};

/// The current access credential
///
/// Replaced wholesale on refresh, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    /// Absolute expiry, computed when the token was issued
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    pub refresh_token: String,
}

impl Credential {
    /// Build a credential from a fresh grant
    ///
    /// `previous_refresh_token` is kept when the authority does not rotate it.
    pub fn issue(grant: &TokenGrant, previous_refresh_token: &str, issued_at: DateTime<Utc>) -> Self {
        Self {
            access_token: grant.access_token.clone(),
            expires_at: issued_at + Duration::seconds(grant.lifetime_secs()),
            refresh_token: grant
                .refresh_token
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| previous_refresh_token.to_string()),
        }
    }

    /// Usable without refresh: `now < expires_at - skew`
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now < self.expires_at - skew
    }

    /// Time left before expiry (negative once expired)
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// Value for the `Authorization` header
    pub fn authorization(&self) -> String {
        format!("Zoho-oauthtoken {}", self.access_token)
    }
}

/// Token blob as kept in the token store
///
/// `expires_in` is the authority's relative lifetime as issued; `expires_at`
/// pins it to the issuance instant so another process can reuse the token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    pub expires_in: i64,
    pub refresh_token: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredTokens {
    const REQUIRED_FIELDS: [&'static str; 3] = ["access_token", "expires_in", "refresh_token"];

    /// Parse and verify a stored blob
    ///
    /// A blob missing any required field fails with `CrmError::Auth` rather
    /// than being patched with defaults.
    pub fn parse(blob: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(blob)
            .map_err(|e| CrmError::auth(format!("stored token blob is not JSON: {}", e)))?;

        let missing: Vec<&str> = Self::REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| value.get(field).is_none_or(Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(CrmError::auth(format!(
                "stored token blob failed verification, missing: {}",
                missing.join(", ")
            )));
        }

        serde_json::from_value(value)
            .map_err(|e| CrmError::auth(format!("stored token blob failed verification: {}", e)))
    }

    pub fn from_credential(credential: &Credential, expires_in: i64) -> Self {
        Self {
            access_token: credential.access_token.clone(),
            expires_in,
            refresh_token: credential.refresh_token.clone(),
            expires_at: Some(credential.expires_at),
        }
    }

    /// The stored credential, if its absolute expiry is known
    pub fn credential(&self) -> Option<Credential> {
        self.expires_at.map(|expires_at| Credential {
            access_token: self.access_token.clone(),
            expires_at,
            refresh_token: self.refresh_token.clone(),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
