//! Credential exchange: trades a password or federated token for a session.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

use crate::auth::federated::FederatedToken;
use crate::auth::session::{Session, now_millis_u64};
use crate::auth::{AuthError, AuthErrorKind};

/// Async credential exchange completion.
pub type AuthFuture = Pin<Box<dyn Future<Output = Result<Session, AuthError>> + Send>>;

/// The backend boundary that turns credentials into sessions.
///
/// Every method registers work and returns a future immediately; nothing
/// blocks the caller. Implementations must be safe to share across tasks.
pub trait CredentialExchange: Send + Sync {
    /// Exchanges an email/password pair for a session.
    fn sign_in_with_password(&self, email: &str, password: &str) -> AuthFuture;

    /// Exchanges a third-party identity token for a session.
    fn sign_in_with_federated_token(&self, token: &FederatedToken) -> AuthFuture;

    /// Creates an account and returns its first session.
    fn sign_up_with_password(&self, email: &str, password: &str) -> AuthFuture;
}

/// Expiry safety margin subtracted from the reported token lifetime.
const EXPIRY_BUFFER_MILLIS: u64 = 60 * 1000;

/// Wire format of a successful exchange response.
#[derive(Debug, Deserialize)]
struct SessionResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Token lifetime in seconds.
    expires_in: u64,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl SessionResponse {
    fn into_session(self) -> Session {
        let lifetime_millis = self.expires_in.saturating_mul(1000);
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: now_millis_u64()
                + lifetime_millis.saturating_sub(EXPIRY_BUFFER_MILLIS),
            display_name: self.display_name,
            email: self.email,
        }
    }
}

/// Reqwest-backed credential exchange against the visor backend.
pub struct HttpCredentialExchange {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCredentialExchange {
    /// Creates an exchange client for the given backend.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Creates an exchange client from loaded configuration.
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(
            config.backend.effective_base_url(),
            config.backend.effective_api_key(),
        )
    }

    fn post_credentials(&self, path: &'static str, body: serde_json::Value) -> AuthFuture {
        let client = self.client.clone();
        let url = format!("{}{path}", self.base_url.trim_end_matches('/'));
        let api_key = self.api_key.clone();

        Box::pin(async move {
            let mut request = client.post(&url).json(&body);
            if let Some(key) = api_key.as_deref() {
                request = request.header("x-api-key", key);
            }

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    AuthError::new(AuthErrorKind::Network, format!("Request timed out: {e}"))
                } else {
                    AuthError::network(format!("Failed to reach {url}: {e}"))
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::debug!(status = status.as_u16(), %url, "credential exchange rejected");
                return Err(if status.is_client_error() {
                    AuthError::invalid_credential(status.as_u16(), &body)
                } else {
                    AuthError::network(format!("HTTP {status} from {url}"))
                });
            }

            let parsed: SessionResponse = response
                .json()
                .await
                .map_err(|e| AuthError::parse(format!("Invalid exchange response: {e}")))?;

            Ok(parsed.into_session())
        })
    }
}

impl CredentialExchange for HttpCredentialExchange {
    fn sign_in_with_password(&self, email: &str, password: &str) -> AuthFuture {
        self.post_credentials(
            "/v1/auth/password",
            serde_json::json!({ "email": email, "password": password }),
        )
    }

    fn sign_in_with_federated_token(&self, token: &FederatedToken) -> AuthFuture {
        self.post_credentials(
            "/v1/auth/federated",
            serde_json::json!({ "id_token": token.as_str() }),
        )
    }

    fn sign_up_with_password(&self, email: &str, password: &str) -> AuthFuture {
        self.post_credentials(
            "/v1/auth/signup",
            serde_json::json!({ "email": email, "password": password }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_response_applies_expiry_buffer() {
        let response = SessionResponse {
            access_token: "vst-abc".to_string(),
            refresh_token: None,
            expires_in: 3600,
            display_name: None,
            email: None,
        };

        let before = now_millis_u64();
        let session = response.into_session();

        let lifetime = session.expires_at.saturating_sub(before);
        assert!(lifetime <= 3600 * 1000 - EXPIRY_BUFFER_MILLIS + 1000);
        assert!(!session.is_expired());
    }

    #[test]
    fn test_short_lifetime_does_not_underflow() {
        let response = SessionResponse {
            access_token: "vst-abc".to_string(),
            refresh_token: None,
            expires_in: 1,
            display_name: None,
            email: None,
        };

        // 1s lifetime minus the buffer saturates to zero instead of wrapping.
        let session = response.into_session();
        assert!(session.expires_at >= now_millis_u64().saturating_sub(1000));
    }
}
