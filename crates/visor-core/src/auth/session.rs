//! Session persistence.
//!
//! Stores the authenticated session in `<base>/session.json` with restricted
//! permissions (0600). Tokens are never logged or displayed in full.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::paths;

pub(crate) fn now_millis_u64() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or(u64::MAX)
}

/// Authenticated identity held after a successful credential exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The backend session token
    pub access_token: String,
    /// Optional long-lived refresh token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry timestamp in milliseconds since epoch
    pub expires_at: u64,
    /// Display name reported by the backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Email address the session was created for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Session {
    /// Returns true if the session is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        now_millis_u64() >= self.expires_at
    }

    /// Masks the access token for display (first 8 chars + ellipsis).
    pub fn masked_token(&self) -> String {
        if self.access_token.len() > 8 {
            format!("{}…", &self.access_token[..8])
        } else {
            "…".to_string()
        }
    }
}

/// Owner of the current session.
///
/// Only the auth flow controller mutates the store; every other component
/// treats the session as read-only.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    session: Option<Session>,
}

impl SessionStore {
    /// Loads the store from the default session path.
    ///
    /// # Errors
    /// Returns an error if an existing session file cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(paths::session_path())
    }

    /// Loads the store from a specific path.
    /// Starts empty if the file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if an existing session file cannot be read or parsed.
    pub fn load_from(path: PathBuf) -> Result<Self> {
        let session = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read session from {}", path.display()))?;
            Some(
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse session from {}", path.display()))?,
            )
        } else {
            None
        };

        Ok(Self { path, session })
    }

    /// Returns the path this store persists to.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Returns the current session, or None when signed out or expired.
    pub fn current_user(&self) -> Option<&Session> {
        self.session.as_ref().filter(|s| !s.is_expired())
    }

    /// Replaces the session and persists it with restricted permissions.
    ///
    /// # Errors
    /// Returns an error if the session cannot be written to disk.
    pub fn set_session(&mut self, session: Session) -> Result<()> {
        let contents =
            serde_json::to_string_pretty(&session).context("Failed to serialize session")?;
        self.session = Some(session);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        // Write with restricted permissions
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.path)
                .with_context(|| format!("Failed to open {} for writing", self.path.display()))?;
            file.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(&self.path, contents)
                .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        }

        Ok(())
    }

    /// Clears the session from memory and disk.
    /// Returns whether a session existed. A no-op when already signed out.
    ///
    /// # Errors
    /// Returns an error if the session file exists but cannot be removed.
    pub fn sign_out(&mut self) -> Result<bool> {
        let had_session = self.session.take().is_some();

        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
            return Ok(true);
        }

        Ok(had_session)
    }
}
