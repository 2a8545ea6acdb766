//! OIDC identity token verification for inbound deliveries.
//!
//! Cloud Tasks attaches a Google-signed ID token to each delivery when the
//! task was created with an OIDC token request. The token is verified
//! against Google's token-info endpoint.

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("token rejected: {0}")]
    Rejected(String),

    #[error("token verification failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Verifies that `token` is a valid identity token issued for `audience`.
#[async_trait]
pub trait IdTokenVerifier: Send + Sync {
    async fn verify(&self, token: &str, audience: &str) -> Result<(), AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: Option<String>,
    iss: Option<String>,
    exp: Option<String>,
}

/// [`IdTokenVerifier`] backed by Google's token-info endpoint.
#[derive(Debug, Clone)]
pub struct TokenInfoVerifier {
    http: Client,
    tokeninfo_url: String,
}

impl TokenInfoVerifier {
    pub fn new(http: Client, tokeninfo_url: impl Into<String>) -> Self {
        Self {
            http,
            tokeninfo_url: tokeninfo_url.into(),
        }
    }
}

#[async_trait]
impl IdTokenVerifier for TokenInfoVerifier {
    async fn verify(&self, token: &str, audience: &str) -> Result<(), AuthError> {
        let response = self
            .http
            .get(&self.tokeninfo_url)
            .query(&[("id_token", token)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Rejected(format!(
                "tokeninfo returned {}",
                response.status()
            )));
        }

        let info: TokenInfo = response.json().await?;
        check_claims(&info, audience, Utc::now().timestamp())
    }
}

fn check_claims(info: &TokenInfo, audience: &str, now: i64) -> Result<(), AuthError> {
    let aud = info.aud.as_deref().unwrap_or_default();
    if aud != audience {
        debug!(expected = %audience, actual = %aud, "oidc_audience_mismatch");
        return Err(AuthError::Rejected("audience mismatch".to_string()));
    }

    let iss = info.iss.as_deref().unwrap_or_default();
    if !GOOGLE_ISSUERS.contains(&iss) {
        return Err(AuthError::Rejected("unexpected issuer".to_string()));
    }

    let exp = info
        .exp
        .as_deref()
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| AuthError::Rejected("missing exp claim".to_string()))?;
    if exp <= now {
        return Err(AuthError::Rejected("token expired".to_string()));
    }

    Ok(())
}

/// Extract the bearer token from the `Authorization` header.
///
/// The `Bearer` scheme is matched case-insensitively; a header without the
/// scheme is taken as the raw token.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let raw = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let token = match raw.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer ") => raw[7..].trim(),
        _ => raw.trim(),
    };

    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const AUDIENCE: &str = "https://svc/tasks";

    fn info(aud: &str, iss: &str, exp: &str) -> TokenInfo {
        TokenInfo {
            aud: Some(aud.to_string()),
            iss: Some(iss.to_string()),
            exp: Some(exp.to_string()),
        }
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_check_claims_valid() {
        let claims = info(AUDIENCE, "https://accounts.google.com", "2000");
        assert!(check_claims(&claims, AUDIENCE, 1000).is_ok());

        let claims = info(AUDIENCE, "accounts.google.com", "2000");
        assert!(check_claims(&claims, AUDIENCE, 1000).is_ok());
    }

    #[test]
    fn test_check_claims_rejections() {
        let wrong_aud = info("https://other/tasks", "accounts.google.com", "2000");
        assert!(check_claims(&wrong_aud, AUDIENCE, 1000).is_err());

        let wrong_iss = info(AUDIENCE, "https://evil.example.com", "2000");
        assert!(check_claims(&wrong_iss, AUDIENCE, 1000).is_err());

        let expired = info(AUDIENCE, "accounts.google.com", "999");
        assert!(check_claims(&expired, AUDIENCE, 1000).is_err());

        let bad_exp = info(AUDIENCE, "accounts.google.com", "soon");
        assert!(check_claims(&bad_exp, AUDIENCE, 1000).is_err());

        let empty = TokenInfo { aud: None, iss: None, exp: None };
        assert!(check_claims(&empty, AUDIENCE, 1000).is_err());
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")).unwrap(), "abc.def");
        assert_eq!(bearer_token(&headers("bearer abc.def")).unwrap(), "abc.def");
        assert_eq!(bearer_token(&headers("abc.def")).unwrap(), "abc.def");
        assert!(matches!(
            bearer_token(&headers("Bearer ")),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingToken)
        ));
    }
}
