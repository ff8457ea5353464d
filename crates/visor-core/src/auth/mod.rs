//! Authentication: session storage, credential exchange, sign-in flows.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod controller;
pub mod exchange;
pub mod federated;
pub mod session;

pub use controller::{AuthEvent, AuthFlowController, AuthPhase};
pub use exchange::{AuthFuture, CredentialExchange, HttpCredentialExchange};
pub use federated::{FederatedProvider, FederatedToken, TokenFuture};
pub use session::{Session, SessionStore};

/// Categories of authentication errors for consistent error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorKind {
    /// Empty required field, rejected locally before any network call
    Validation,
    /// The exchange service rejected the credential
    InvalidCredential,
    /// Transport failure (connect, timeout, non-auth HTTP status)
    Network,
    /// Failed to parse the exchange response
    Parse,
    /// The federated sign-in flow was cancelled or abandoned
    Cancelled,
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorKind::Validation => write!(f, "validation"),
            AuthErrorKind::InvalidCredential => write!(f, "invalid_credential"),
            AuthErrorKind::Network => write!(f, "network"),
            AuthErrorKind::Parse => write!(f, "parse"),
            AuthErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Structured authentication error with kind and details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthError {
    /// Error category
    pub kind: AuthErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
}

impl AuthError {
    /// Creates a new authentication error.
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates a local validation error (no network call was made).
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Validation, message)
    }

    /// Creates a rejected-credential error, extracting a cleaner message
    /// from a JSON error body when one is present.
    pub fn invalid_credential(status: u16, body: &str) -> Self {
        let message = extract_error_message(body)
            .map_or_else(|| format!("HTTP {status}"), |msg| format!("HTTP {status}: {msg}"));
        Self {
            kind: AuthErrorKind::InvalidCredential,
            message,
            details: (!body.is_empty()).then(|| body.to_string()),
        }
    }

    /// Creates a transport error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Network, message)
    }

    /// Creates a response-parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Parse, message)
    }

    /// Creates a cancelled-flow error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Cancelled, message)
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AuthError {}

/// Pulls `error.message` out of a JSON error body, if the body has one.
fn extract_error_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("error")?
        .get("message")?
        .as_str()
        .map(ToString::to_string)
}
