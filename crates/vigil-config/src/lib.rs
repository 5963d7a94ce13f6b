//! Shared configuration and persisted local state for the vigil client.
//!
//! TOML config + `VIGIL_`-prefixed environment overrides, translation
//! to `vigil_core::ClientConfig`, and the two durable stores the core
//! expects: token persistence (keyring with a file fallback) and the
//! status-override cache.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use vigil_core::{ClientConfig, RollbackPolicy, TlsVerification};

mod cache;
mod tokens;

pub use cache::FileOverrideStore;
pub use tokens::{KeyringTokenStore, TokenStoreBackend};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Incident backend settings.
    #[serde(default)]
    pub backend: Backend,

    /// UI preferences that survive restarts.
    #[serde(default)]
    pub ui: UiPreferences,
}

/// Connection settings for the incident backend.
#[derive(Debug, Deserialize, Serialize)]
pub struct Backend {
    /// Backend base URL (e.g. "https://vigil.example.com").
    #[serde(default = "default_url")]
    pub url: String,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Skip TLS verification (self-signed lab backends).
    #[serde(default)]
    pub insecure: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Full-snapshot refetch interval in seconds. 0 = never.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Enable the live push channel.
    #[serde(default = "default_push_enabled")]
    pub push_enabled: bool,

    /// Revert optimistic status edits when the server definitively
    /// rejects them.
    #[serde(default)]
    pub revert_rejected_edits: bool,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            url: default_url(),
            ca_cert: None,
            insecure: false,
            timeout: default_timeout(),
            refresh_interval_secs: default_refresh_interval(),
            push_enabled: default_push_enabled(),
            revert_rejected_edits: false,
        }
    }
}

/// Persisted UI preferences.
#[derive(Debug, Deserialize, Serialize)]
pub struct UiPreferences {
    /// Color theme: "dark" or "light".
    #[serde(default = "default_theme")]
    pub theme: String,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            theme: default_theme(),
        }
    }
}

fn default_url() -> String {
    "https://localhost:8443".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_refresh_interval() -> u64 {
    300
}
fn default_push_enabled() -> bool {
    true
}
fn default_theme() -> String {
    "dark".into()
}

// ── Paths ───────────────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "vigil-dash", "vigil").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Resolve the local-state directory (override cache, token fallback).
pub fn state_dir() -> PathBuf {
    ProjectDirs::from("com", "vigil-dash", "vigil")
        .map_or_else(dirs_fallback, |dirs| dirs.data_dir().to_path_buf())
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("vigil");
    p
}

// ── Config loading / saving ─────────────────────────────────────────

/// Load the full `Config` from file + environment.
///
/// Environment variables use a `VIGIL_` prefix with `_` as the section
/// separator, e.g. `VIGIL_BACKEND_URL`, `VIGIL_UI_THEME`.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load a `Config` from an explicit path (tests, portable setups).
pub fn load_config_from(path: &std::path::Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("VIGIL_").split("_"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning defaults if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(())
}

// ── Translation to core config ──────────────────────────────────────

/// Build a `vigil_core::ClientConfig` from the loaded config.
pub fn to_client_config(cfg: &Config) -> Result<ClientConfig, ConfigError> {
    let url: url::Url = cfg
        .backend
        .url
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "backend.url".into(),
            reason: format!("invalid URL: {}", cfg.backend.url),
        })?;

    let tls = if cfg.backend.insecure {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = cfg.backend.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let rollback = if cfg.backend.revert_rejected_edits {
        RollbackPolicy::RevertOnRejection
    } else {
        RollbackPolicy::KeepLocal
    };

    Ok(ClientConfig {
        url,
        tls,
        timeout: Duration::from_secs(cfg.backend.timeout),
        refresh_interval_secs: cfg.backend.refresh_interval_secs,
        push_enabled: cfg.backend.push_enabled,
        reconnect_debounce: Duration::from_millis(300),
        rollback,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_translate_to_a_valid_client_config() {
        let client = to_client_config(&Config::default()).unwrap();
        assert_eq!(client.url.as_str(), "https://localhost:8443/");
        assert_eq!(client.tls, TlsVerification::SystemDefaults);
        assert_eq!(client.rollback, RollbackPolicy::KeepLocal);
        assert!(client.push_enabled);
    }

    #[test]
    fn insecure_flag_wins_over_custom_ca() {
        let mut cfg = Config::default();
        cfg.backend.insecure = true;
        cfg.backend.ca_cert = Some(PathBuf::from("/tmp/ca.pem"));
        let client = to_client_config(&cfg).unwrap();
        assert_eq!(client.tls, TlsVerification::DangerAcceptInvalid);
    }

    #[test]
    fn bad_url_is_a_validation_error() {
        let mut cfg = Config::default();
        cfg.backend.url = "not a url".into();
        assert!(matches!(
            to_client_config(&cfg),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [backend]
            url = "https://soc.example.com"
            refresh_interval_secs = 60
            revert_rejected_edits = true

            [ui]
            theme = "light"
            "#,
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.backend.url, "https://soc.example.com");
        assert_eq!(cfg.backend.refresh_interval_secs, 60);
        assert_eq!(cfg.ui.theme, "light");
        assert_eq!(
            to_client_config(&cfg).unwrap().rollback,
            RollbackPolicy::RevertOnRejection
        );
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut cfg = Config::default();
        cfg.ui.theme = "light".into();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.ui.theme, "light");
        assert_eq!(parsed.backend.url, cfg.backend.url);
    }
}
