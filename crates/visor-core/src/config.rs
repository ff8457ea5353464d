//! Configuration management for visor.
//!
//! Loads configuration from ${VISOR_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Backend service configuration (credential exchange + vision endpoints).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the visor backend.
    pub base_url: String,
    /// Optional API key sent alongside anonymous auth requests.
    pub api_key: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: Config::DEFAULT_BASE_URL.to_string(),
            api_key: None,
        }
    }
}

impl BackendConfig {
    /// Resolves the effective base URL with precedence: env > config.
    pub fn effective_base_url(&self) -> String {
        if let Ok(url) = std::env::var("VISOR_BASE_URL") {
            let trimmed = url.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
        self.base_url.clone()
    }

    /// Resolves the effective API key with precedence: config > env.
    pub fn effective_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_deref() {
            let trimmed = key.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        std::env::var("VISOR_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

/// Vision request configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Maximum image width before client-side downscale.
    pub max_image_width: u32,
    /// Maximum image height before client-side downscale.
    pub max_image_height: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            max_image_width: 2048,
            max_image_height: 2048,
        }
    }
}

impl VisionConfig {
    /// Returns (width, height) limits for image decoding.
    pub fn max_dims(&self) -> (u32, u32) {
        (self.max_image_width, self.max_image_height)
    }
}

/// Federated sign-in (OAuth) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FederatedConfig {
    /// OAuth client ID registered with the identity provider.
    pub client_id: String,
    /// Authorization endpoint of the identity provider.
    pub auth_url: String,
    /// Scopes requested during sign-in.
    pub scopes: String,
}

impl Default for FederatedConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            scopes: "openid email profile".to_string(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend service settings.
    pub backend: BackendConfig,

    /// Vision request settings.
    pub vision: VisionConfig,

    /// Federated sign-in settings.
    pub federated: FederatedConfig,
}

/// Returns the default config template with comments.
///
/// This is embedded from default_config.toml at compile time.
/// To update, edit default_config.toml directly.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

impl Config {
    const DEFAULT_BASE_URL: &str = "https://api.visor.example.com";

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Writes the default template to the config path.
    ///
    /// # Errors
    /// Fails if the file already exists or cannot be written.
    pub fn init() -> Result<std::path::PathBuf> {
        let path = paths::config_path();
        if path.exists() {
            anyhow::bail!("Config already exists at {}", path.display());
        }
        Self::write_config(&path, default_config_template())?;
        Ok(path)
    }

    /// Saves only the backend base URL to the config file.
    ///
    /// Creates the file with the default template if it doesn't exist.
    /// Preserves existing fields and comments using toml_edit.
    ///
    /// # Errors
    /// Returns an error if the config cannot be read, parsed, or written.
    pub fn save_backend_url(url: &str) -> Result<()> {
        Self::save_backend_url_to(&paths::config_path(), url)
    }

    /// Saves only the backend base URL to a specific config file path.
    ///
    /// # Errors
    /// Returns an error if the config cannot be read, parsed, or written.
    pub fn save_backend_url_to(path: &Path, url: &str) -> Result<()> {
        use toml_edit::{DocumentMut, value};

        let contents = if path.exists() {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?
        } else {
            default_config_template().to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        doc["backend"]["base_url"] = value(url);

        Self::write_config(path, &doc.to_string())
    }

    fn write_config(path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}

pub mod paths {
    //! Path resolution for visor configuration and data directories.
    //!
    //! VISOR_HOME resolution order:
    //! 1. VISOR_HOME environment variable (if set)
    //! 2. ~/.config/visor (default)

    use std::path::PathBuf;

    /// Returns the visor home directory.
    ///
    /// Checks VISOR_HOME env var first, falls back to ~/.config/visor
    pub fn visor_home() -> PathBuf {
        if let Ok(home) = std::env::var("VISOR_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir()
            .map(|h| h.join(".config").join("visor"))
            .expect("Could not determine home directory")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        visor_home().join("config.toml")
    }

    /// Returns the path to the persisted session file.
    pub fn session_path() -> PathBuf {
        visor_home().join("session.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();

        assert_eq!(config.backend.base_url, Config::DEFAULT_BASE_URL);
        assert_eq!(config.vision.max_dims(), (2048, 2048));
    }

    #[test]
    fn test_load_from_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backend]\nbase_url = \"http://localhost:9000\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.backend.base_url, "http://localhost:9000");
        assert_eq!(config.vision.max_image_width, 2048);
    }

    #[test]
    fn test_save_backend_url_creates_from_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        Config::save_backend_url_to(&path, "http://localhost:1234").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.backend.base_url, "http://localhost:1234");
    }

    #[test]
    fn test_default_template_parses() {
        let config: Config = toml::from_str(default_config_template()).unwrap();
        assert_eq!(config.backend.base_url, Config::DEFAULT_BASE_URL);
    }
}
