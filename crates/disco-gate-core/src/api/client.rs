//! API client for the Disco session renewal endpoint.
//!
//! This module provides the `ApiClient` struct, which performs the one
//! network round trip the session gate ever makes: exchanging a refresh
//! token for a new access token.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::RenewalError;

// ============================================================================
// Constants
// ============================================================================

/// Path of the login endpoint; `using=refresh_token` selects renewal.
const RENEWAL_PATH: &str = "/api/users/auth/login";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Longest access token lifetime accepted from the backend (ten years).
pub const MAX_EXPIRES_IN_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Serialize)]
struct RenewalRequest<'a> {
    refresh_token: &'a str,
}

/// Success body of the renewal endpoint. The backend also sends
/// `token_type`, `refresh_token` and `scope`; none of them are used here.
#[derive(Debug, Deserialize)]
struct RenewalResponse {
    access_token: String,
    expires_in: i64,
}

/// A freshly minted access token and its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalGrant {
    pub access_token: String,
    pub expires_in: i64,
}

impl RenewalGrant {
    /// Lifetime to store the token with, or `None` if `expires_in` is not
    /// in `1..=MAX_EXPIRES_IN_SECS`.
    pub fn ttl(&self) -> Option<chrono::Duration> {
        if (1..=MAX_EXPIRES_IN_SECS).contains(&self.expires_in) {
            chrono::Duration::try_seconds(self.expires_in)
        } else {
            None
        }
    }
}

/// Parse and validate a success body.
///
/// An empty token or a non-positive lifetime would produce a credential the
/// store can never serve, so both are rejected as malformed. So is a
/// lifetime past `MAX_EXPIRES_IN_SECS`.
pub fn parse_renewal(body: &str) -> Result<RenewalGrant, RenewalError> {
    let response: RenewalResponse = serde_json::from_str(body)
        .map_err(|e| RenewalError::MalformedResponse(e.to_string()))?;

    if response.access_token.is_empty() {
        return Err(RenewalError::MalformedResponse(
            "empty access_token".to_string(),
        ));
    }
    if response.expires_in <= 0 {
        return Err(RenewalError::MalformedResponse(format!(
            "non-positive expires_in: {}",
            response.expires_in
        )));
    }

    let grant = RenewalGrant {
        access_token: response.access_token,
        expires_in: response.expires_in,
    };
    if grant.ttl().is_none() {
        return Err(RenewalError::MalformedResponse(format!(
            "expires_in out of range: {}",
            grant.expires_in
        )));
    }
    Ok(grant)
}

/// Anything that can exchange a refresh token for a new access token.
pub trait RenewalTransport: Send + Sync + 'static {
    fn renew(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<RenewalGrant, RenewalError>> + Send;
}

/// API client for the Disco backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl ApiClient {
    /// Create a new API client with the default request timeout
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn renewal_url(&self) -> String {
        format!("{}{}", self.base_url, RENEWAL_PATH)
    }

    /// POST the refresh token to the login endpoint and parse the new
    /// access token out of the response.
    pub async fn renew_session(&self, refresh_token: &str) -> Result<RenewalGrant, RenewalError> {
        let url = self.renewal_url();
        debug!(url = %url, "Sending renewal request");

        let response = self
            .client
            .post(&url)
            .query(&[("using", "refresh_token")])
            .header(header::ACCEPT, "application/json")
            .json(&RenewalRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RenewalError::from_transport(&e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenewalError::from_status(status, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RenewalError::from_transport(&e, self.timeout))?;

        parse_renewal(&body).inspect_err(|e| {
            warn!(error = %e, "Renewal succeeded but response could not be used");
        })
    }
}

impl RenewalTransport for ApiClient {
    fn renew(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<RenewalGrant, RenewalError>> + Send {
        self.renew_session(refresh_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_renewal_full_backend_response() {
        let json = r#"{"access_token":"eyJ0eXAi.abc.def","token_type":"Bearer","expires_in":3600,"refresh_token":"r-123","scope":"User login"}"#;

        let grant = parse_renewal(json).expect("Failed to parse renewal test JSON");
        assert_eq!(grant.access_token, "eyJ0eXAi.abc.def");
        assert_eq!(grant.expires_in, 3600);
        assert_eq!(grant.ttl(), Some(chrono::Duration::hours(1)));
    }

    #[test]
    fn test_parse_renewal_missing_fields() {
        assert!(matches!(
            parse_renewal(r#"{"expires_in":3600}"#),
            Err(RenewalError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_renewal(r#"{"access_token":"T"}"#),
            Err(RenewalError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_renewal("<html>502 Bad Gateway</html>"),
            Err(RenewalError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_renewal_rejects_unusable_values() {
        assert!(matches!(
            parse_renewal(r#"{"access_token":"","expires_in":3600}"#),
            Err(RenewalError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_renewal(r#"{"access_token":"T","expires_in":0}"#),
            Err(RenewalError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_renewal(r#"{"access_token":"T","expires_in":"3600"}"#),
            Err(RenewalError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_renewal_rejects_huge_expires_in() {
        let json = format!(r#"{{"access_token":"T","expires_in":{}}}"#, i64::MAX);
        assert!(matches!(
            parse_renewal(&json),
            Err(RenewalError::MalformedResponse(_))
        ));

        let json = format!(
            r#"{{"access_token":"T","expires_in":{}}}"#,
            MAX_EXPIRES_IN_SECS + 1
        );
        assert!(matches!(
            parse_renewal(&json),
            Err(RenewalError::MalformedResponse(_))
        ));

        let json = format!(
            r#"{{"access_token":"T","expires_in":{}}}"#,
            MAX_EXPIRES_IN_SECS
        );
        let grant = parse_renewal(&json).unwrap();
        assert_eq!(grant.ttl(), Some(chrono::Duration::seconds(MAX_EXPIRES_IN_SECS)));
    }

    #[test]
    fn test_grant_ttl_out_of_range() {
        let grant = |expires_in| RenewalGrant {
            access_token: "T".to_string(),
            expires_in,
        };
        assert_eq!(grant(i64::MAX).ttl(), None);
        assert_eq!(grant(0).ttl(), None);
        assert_eq!(grant(-1).ttl(), None);
        assert_eq!(grant(60).ttl(), Some(chrono::Duration::minutes(1)));
    }

    #[test]
    fn test_renewal_url_trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(
            client.renewal_url(),
            "http://localhost:8000/api/users/auth/login"
        );
    }
}
