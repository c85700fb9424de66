//! Federation configuration.
//!
//! Loaded from `FEDERATION_*` environment variables. The signing secret is
//! resolved fail-closed: outside development a real, non-default key is
//! required and startup is refused without one.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

use fedack_core::{SharedKey, VerifyOptions, DEFAULT_MAX_AGE_SEC};
use fedack_store::DEFAULT_ROTATE_BYTES;

/// Secret used in development when none is configured.
pub const DEV_FALLBACK_KEY: &str = "dev-federation-key";

/// Environment variable names.
pub mod vars {
    pub const FEDERATION_KEY: &str = "FEDERATION_KEY";
    pub const FEDERATION_ENV: &str = "FEDERATION_ENV";
    pub const FEDERATION_NODE_ID: &str = "FEDERATION_NODE_ID";
    pub const FEDERATION_DATA_DIR: &str = "FEDERATION_DATA_DIR";
    pub const FEDERATION_MAX_AGE_SEC: &str = "FEDERATION_MAX_AGE_SEC";
    pub const FEDERATION_ALLOWED_NODES: &str = "FEDERATION_ALLOWED_NODES";
    pub const FEDERATION_ALLOW_MAINTENANCE: &str = "FEDERATION_ALLOW_MAINTENANCE";
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("FEDERATION_KEY is not set; refusing to start in production")]
    MissingKey,

    #[error("FEDERATION_KEY is the development fallback; refusing to start in production")]
    InsecureKey,

    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Where this node runs. Only development may fall back to a default key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeploymentMode {
    Development,
    #[default]
    Production,
}

impl FromStr for DeploymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(DeploymentMode::Development),
            "production" | "prod" => Ok(DeploymentMode::Production),
            other => Err(format!("unknown deployment mode '{other}'")),
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentMode::Development => f.write_str("development"),
            DeploymentMode::Production => f.write_str("production"),
        }
    }
}

/// Configuration for a federation node.
#[derive(Debug, Clone)]
pub struct FederationConfig {
    pub mode: DeploymentMode,
    /// This node's id, stamped on ACKs it creates.
    pub node_id: String,
    /// Holds `ack_ledger.db`, `ack_ledger.jsonl` and `nonce_store.db`.
    pub data_dir: PathBuf,
    /// Explicitly configured signing secret.
    pub shared_key: Option<SharedKey>,
    /// Freshness window and nonce TTL.
    pub max_age_sec: u64,
    /// Accepted origin nodes; `None` accepts any.
    pub allowed_nodes: Option<BTreeSet<String>>,
    /// Enables `clear`.
    pub allow_destructive_maintenance: bool,
    /// Export size above which the JSONL file is rotated.
    pub export_rotate_bytes: u64,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::Production,
            node_id: "atlas-local".to_string(),
            data_dir: PathBuf::from(".logs/federation"),
            shared_key: None,
            max_age_sec: DEFAULT_MAX_AGE_SEC,
            allowed_nodes: None,
            allow_destructive_maintenance: false,
            export_rotate_bytes: DEFAULT_ROTATE_BYTES,
        }
    }
}

impl FederationConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(mode) = lookup(vars::FEDERATION_ENV) {
            config.mode = mode.parse().map_err(|message| ConfigError::InvalidValue {
                var: vars::FEDERATION_ENV.to_string(),
                message,
            })?;
        }

        if let Some(node_id) = lookup(vars::FEDERATION_NODE_ID).filter(|v| !v.trim().is_empty()) {
            config.node_id = node_id.trim().to_string();
        }

        if let Some(dir) = lookup(vars::FEDERATION_DATA_DIR).filter(|v| !v.is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }

        // An empty secret counts as unset.
        if let Some(secret) = lookup(vars::FEDERATION_KEY).filter(|v| !v.is_empty()) {
            config.shared_key = Some(SharedKey::new(secret.into_bytes()).map_err(|e| {
                ConfigError::InvalidValue {
                    var: vars::FEDERATION_KEY.to_string(),
                    message: e.to_string(),
                }
            })?);
        }

        if let Some(raw) = lookup(vars::FEDERATION_MAX_AGE_SEC) {
            config.max_age_sec = match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: vars::FEDERATION_MAX_AGE_SEC.to_string(),
                        message: format!("expected a positive integer, got '{raw}'"),
                    })
                }
            };
        }

        if let Some(raw) = lookup(vars::FEDERATION_ALLOWED_NODES) {
            let nodes: BTreeSet<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from)
                .collect();
            config.allowed_nodes = Some(nodes);
        }

        if let Some(raw) = lookup(vars::FEDERATION_ALLOW_MAINTENANCE) {
            config.allow_destructive_maintenance =
                matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes");
        }

        Ok(config)
    }

    /// The signing key this node must use.
    ///
    /// Production requires an explicit key other than [`DEV_FALLBACK_KEY`].
    /// Development without a key falls back to it, with a warning.
    pub fn resolve_shared_key(&self) -> Result<SharedKey, ConfigError> {
        let fallback = SharedKey::from_static(DEV_FALLBACK_KEY);

        match (&self.shared_key, self.mode) {
            (Some(key), DeploymentMode::Production) if *key == fallback => {
                Err(ConfigError::InsecureKey)
            }
            (Some(key), _) => Ok(key.clone()),
            (None, DeploymentMode::Production) => Err(ConfigError::MissingKey),
            (None, DeploymentMode::Development) => {
                warn!("FEDERATION_KEY not set; using the development fallback key");
                Ok(fallback)
            }
        }
    }

    pub fn verify_options(&self) -> VerifyOptions {
        VerifyOptions {
            max_age_sec: self.max_age_sec,
            allowed_nodes: self.allowed_nodes.clone(),
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ack_ledger.db")
    }

    pub fn export_path(&self) -> PathBuf {
        self.data_dir.join("ack_ledger.jsonl")
    }

    pub fn nonce_store_path(&self) -> PathBuf {
        self.data_dir.join("nonce_store.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<FederationConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FederationConfig::from_lookup(|var| env.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.mode, DeploymentMode::Production);
        assert_eq!(config.node_id, "atlas-local");
        assert_eq!(config.max_age_sec, 300);
        assert!(config.allowed_nodes.is_none());
        assert!(!config.allow_destructive_maintenance);
        assert_eq!(config.ledger_path(), PathBuf::from(".logs/federation/ack_ledger.db"));
    }

    #[test]
    fn test_production_without_key_fails_closed() {
        let config = load(&[]).unwrap();
        assert!(matches!(config.resolve_shared_key(), Err(ConfigError::MissingKey)));

        let config = load(&[(vars::FEDERATION_KEY, "")]).unwrap();
        assert!(matches!(config.resolve_shared_key(), Err(ConfigError::MissingKey)));
    }

    #[test]
    fn test_production_rejects_fallback_key() {
        let config = load(&[(vars::FEDERATION_KEY, DEV_FALLBACK_KEY)]).unwrap();
        assert!(matches!(config.resolve_shared_key(), Err(ConfigError::InsecureKey)));
    }

    #[test]
    fn test_development_falls_back() {
        let config = load(&[(vars::FEDERATION_ENV, "development")]).unwrap();
        let key = config.resolve_shared_key().unwrap();
        assert_eq!(key, SharedKey::from_static(DEV_FALLBACK_KEY));
    }

    #[test]
    fn test_explicit_key_used() {
        let config = load(&[(vars::FEDERATION_KEY, "s3cret")]).unwrap();
        assert_eq!(
            config.resolve_shared_key().unwrap(),
            SharedKey::from_static("s3cret")
        );
    }

    #[test]
    fn test_parses_all_variables() {
        let config = load(&[
            (vars::FEDERATION_ENV, "Dev"),
            (vars::FEDERATION_NODE_ID, " tower-1 "),
            (vars::FEDERATION_DATA_DIR, "/var/lib/fed"),
            (vars::FEDERATION_MAX_AGE_SEC, "60"),
            (vars::FEDERATION_ALLOWED_NODES, "atlas-local, tower-1,,"),
            (vars::FEDERATION_ALLOW_MAINTENANCE, "TRUE"),
        ])
        .unwrap();

        assert_eq!(config.mode, DeploymentMode::Development);
        assert_eq!(config.node_id, "tower-1");
        assert_eq!(config.nonce_store_path(), PathBuf::from("/var/lib/fed/nonce_store.db"));
        assert_eq!(config.max_age_sec, 60);
        let allowed = config.allowed_nodes.clone().unwrap();
        assert_eq!(allowed.len(), 2);
        assert!(allowed.contains("tower-1"));
        assert!(config.allow_destructive_maintenance);
        assert_eq!(config.verify_options().max_age_sec, 60);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            load(&[(vars::FEDERATION_ENV, "staging")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            load(&[(vars::FEDERATION_MAX_AGE_SEC, "0")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            load(&[(vars::FEDERATION_MAX_AGE_SEC, "five")]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let config = load(&[(vars::FEDERATION_KEY, "do-not-print-me")]).unwrap();
        assert!(!format!("{config:?}").contains("do-not-print-me"));
    }
}
