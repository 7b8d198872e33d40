//! Token authority: exchanges a refresh token for a new access token

use serde::Deserialize;
use std::sync::Arc;

use crate::error::{CrmError, Result};
use crate::http::{HttpRequest, Transport};

/// Token response from the accounts server
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Lifetime in seconds, sent by older accounts servers next to a
    /// millisecond `expires_in`
    #[serde(default)]
    pub expires_in_sec: Option<i64>,
    #[serde(default)]
    pub api_domain: Option<String>,
}

impl TokenGrant {
    /// Lifetime used when the grant carries none
    pub const DEFAULT_LIFETIME_SECS: i64 = 3600;

    /// Token lifetime in seconds
    pub fn lifetime_secs(&self) -> i64 {
        self.expires_in_sec
            .or(self.expires_in)
            .filter(|secs| *secs > 0)
            .unwrap_or(Self::DEFAULT_LIFETIME_SECS)
    }
}

/// Error body of the accounts server (sent with a 200 status as well)
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
}

/// The remote endpoint that mints access tokens
pub trait TokenAuthority: Send + Sync {
    /// Mint a new access token from `refresh_token`
    fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// OAuth2 refresh-token grant against the accounts server
pub struct OAuthTokenAuthority {
    transport: Arc<dyn Transport>,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl OAuthTokenAuthority {
    /// Token endpoint path on the accounts server
    const TOKEN_PATH: &'static str = "/oauth/v2/token";

    pub fn new(
        transport: Arc<dyn Transport>,
        accounts_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            token_url: format!("{}{}", accounts_url.trim_end_matches('/'), Self::TOKEN_PATH),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl TokenAuthority for OAuthTokenAuthority {
    fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let request = HttpRequest::post(&self.token_url).form([
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ]);

        let response = self.transport.execute(&request)?;

        if let Ok(err) = response.json::<TokenErrorResponse>() {
            return Err(CrmError::auth(format!(
                "token refresh rejected (status {}): {}",
                response.status, err.error
            )));
        }
        if !response.is_success() {
            return Err(CrmError::auth(format!(
                "token refresh failed with status {}",
                response.status
            )));
        }

        response
            .json::<TokenGrant>()
            .map_err(|e| CrmError::auth(format!("Failed to parse refresh token response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, RequestBody};
    use crate::test_support::ScriptedTransport;
    use serde_json::json;

    fn authority(transport: Arc<ScriptedTransport>) -> OAuthTokenAuthority {
        OAuthTokenAuthority::new(transport, "https://accounts.example.test/", "client", "secret")
    }

    #[test]
    fn test_refresh_posts_grant_form() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            Ok(HttpResponse::json_body(
                200,
                &json!({"access_token": "1000.fresh", "expires_in": 3600, "api_domain": "https://www.zohoapis.com"}),
            ))
        }));

        let grant = authority(transport.clone()).refresh("1000.refresh").unwrap();
        assert_eq!(grant.access_token, "1000.fresh");
        assert_eq!(grant.lifetime_secs(), 3600);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://accounts.example.test/oauth/v2/token");
        match &requests[0].body {
            Some(RequestBody::Form(fields)) => {
                assert!(fields.contains(&("grant_type".to_string(), "refresh_token".to_string())));
                assert!(fields.contains(&("refresh_token".to_string(), "1000.refresh".to_string())));
            }
            other => panic!("expected form body, got {:?}", other),
        }
    }

    #[test]
    fn test_error_body_with_ok_status_is_rejected() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            Ok(HttpResponse::json_body(200, &json!({"error": "invalid_code"})))
        }));

        let err = authority(transport).refresh("stale").unwrap_err();
        assert!(err.is_auth());
        assert!(err.to_string().contains("invalid_code"));
    }

    #[test]
    fn test_legacy_millisecond_lifetime() {
        let grant: TokenGrant = serde_json::from_value(json!({
            "access_token": "a",
            "expires_in": 3_600_000,
            "expires_in_sec": 3600
        }))
        .unwrap();
        assert_eq!(grant.lifetime_secs(), 3600);
    }
}
