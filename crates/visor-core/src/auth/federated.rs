//! Federated identity provider seam and OAuth flow helpers.
//!
//! The provider hands back an identity token; the credential exchange then
//! trades it for a backend session. The helpers here are the pure pieces of
//! the flow (PKCE, URL building, pasted-input parsing) shared with the CLI.

use std::future::Future;
use std::pin::Pin;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use crate::auth::AuthError;
use crate::config::FederatedConfig;

/// Identity token issued by a third-party sign-in provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedToken(String);

impl FederatedToken {
    /// Wraps a raw identity token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Async federated sign-in completion.
pub type TokenFuture = Pin<Box<dyn Future<Output = Result<FederatedToken, AuthError>> + Send>>;

/// A third-party sign-in flow that produces an identity token.
///
/// A cancelled or abandoned flow resolves to `AuthErrorKind::Cancelled`.
pub trait FederatedProvider: Send + Sync {
    /// Launches the sign-in flow and resolves with the identity token.
    fn launch_sign_in(&self) -> TokenFuture;
}

/// Local OAuth callback path (port is dynamic).
pub const LOCAL_CALLBACK_PATH: &str = "/auth/callback";

/// PKCE code verifier and challenge.
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

/// Generates a PKCE code verifier and its S256 challenge.
pub fn generate_pkce() -> Pkce {
    // Two UUIDs give 32 random bytes for the verifier.
    let mut verifier_bytes = [0u8; 32];
    verifier_bytes[..16].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    verifier_bytes[16..].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

    Pkce {
        verifier,
        challenge,
    }
}

/// Builds the authorization URL for the configured identity provider.
pub fn build_auth_url(
    config: &FederatedConfig,
    pkce: &Pkce,
    state: &str,
    redirect_uri: &str,
) -> String {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("response_type", "code"),
        ("redirect_uri", redirect_uri),
        ("scope", config.scopes.as_str()),
        ("code_challenge", &pkce.challenge),
        ("code_challenge_method", "S256"),
        ("state", state),
    ];

    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();

    format!("{}?{query}", config.auth_url)
}

/// Builds the redirect URI for a given localhost port.
pub fn build_redirect_uri(port: u16) -> String {
    format!("http://localhost:{port}{LOCAL_CALLBACK_PATH}")
}

/// Generates a random high localhost port for OAuth callbacks.
pub fn random_local_port() -> u16 {
    let id = uuid::Uuid::new_v4();
    let bytes = id.as_bytes();
    let raw = u16::from_le_bytes([bytes[0], bytes[1]]);
    49152 + (raw % 16384)
}

/// Parses a pasted authorization input into token + optional state.
///
/// Accepts a full redirect URL, a `token#state` pair, a raw query string,
/// or a bare token.
pub fn parse_authorization_input(input: &str) -> (Option<String>, Option<String>) {
    let value = input.trim();
    if value.is_empty() {
        return (None, None);
    }

    if let Ok(url) = url::Url::parse(value) {
        let code = url.query_pairs().find(|(k, _)| k == "code").map(|(_, v)| v);
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v);
        return (code.map(|v| v.to_string()), state.map(|v| v.to_string()));
    }

    if let Some((code, state)) = value.split_once('#') {
        return (Some(code.to_string()), Some(state.to_string()));
    }

    if value.contains("code=") {
        let params = url::form_urlencoded::parse(value.as_bytes()).collect::<Vec<_>>();
        let code = params.iter().find(|(k, _)| k == "code").map(|(_, v)| v);
        let state = params.iter().find(|(k, _)| k == "state").map(|(_, v)| v);
        return (
            code.map(ToString::to_string),
            state.map(ToString::to_string),
        );
    }

    (Some(value.to_string()), None)
}
