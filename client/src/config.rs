//! Network configuration shared by the operator tools.

use crate::{defaults, registrar::RegistrarConfig};
use namereg_types::NetworkIdentity;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use thiserror::Error;
use tracing::Level;
use url::Url;

/// Network configuration, as read from YAML.
///
/// Signing keys never live here; see [load_key].
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub network: String,
    pub rpc_url: String,
    pub chain_id: u64,
    /// Network still runs the legacy registry.
    #[serde(default)]
    pub legacy: bool,
    /// Leave the root with the deployer after bootstrap.
    #[serde(default)]
    pub root_stays_open: bool,
    #[serde(default = "default_confirmations")]
    pub confirmations: usize,
    #[serde(default = "default_artifacts")]
    pub artifacts: String,
    #[serde(default = "default_deployments")]
    pub deployments: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_age_margin_secs")]
    pub age_margin_secs: u64,
    #[serde(default = "default_price_buffer_bps")]
    pub price_buffer_bps: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_confirmations() -> usize {
    defaults::DEFAULT_CONFIRMATIONS
}

fn default_artifacts() -> String {
    defaults::DEFAULT_ARTIFACTS_DIR.to_string()
}

fn default_deployments() -> String {
    defaults::DEFAULT_DEPLOYMENTS_DIR.to_string()
}

fn default_poll_interval_ms() -> u64 {
    defaults::DEFAULT_POLL_INTERVAL_MS
}

fn default_age_margin_secs() -> u64 {
    defaults::DEFAULT_AGE_MARGIN_SECS
}

fn default_price_buffer_bps() -> u32 {
    defaults::DEFAULT_PRICE_BUFFER_BPS
}

fn default_log_level() -> String {
    defaults::DEFAULT_LOG_LEVEL.to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("{field} must be a valid URL: {value}")]
    InvalidUrl { field: &'static str, value: String },
    #[error("{field} URL scheme must be http or https: {value}")]
    InvalidUrlScheme { field: &'static str, value: String },
    #[error("price_buffer_bps must be <= {max} (got {value})")]
    InvalidBps { value: u32, max: u32 },
    #[error("missing {env_key} or {env_file} (flag or env var)")]
    MissingKey {
        env_key: &'static str,
        env_file: &'static str,
    },
    #[error("secret file is empty: {path}")]
    EmptySecret { path: PathBuf },
}

/// Checked configuration.
#[derive(Clone, Debug)]
pub struct ValidatedConfig {
    pub identity: NetworkIdentity,
    pub rpc_url: Url,
    pub root_stays_open: bool,
    pub confirmations: usize,
    pub artifacts: PathBuf,
    pub deployments: PathBuf,
    pub registrar: RegistrarConfig,
    pub log_level: Level,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        if self.network.trim().is_empty() {
            return Err(ConfigError::Empty { field: "network" });
        }
        ensure_nonzero("chain_id", self.chain_id)?;
        ensure_nonzero("confirmations", self.confirmations as u64)?;
        ensure_nonzero("poll_interval_ms", self.poll_interval_ms)?;
        if self.price_buffer_bps > defaults::MAX_PRICE_BUFFER_BPS {
            return Err(ConfigError::InvalidBps {
                value: self.price_buffer_bps,
                max: defaults::MAX_PRICE_BUFFER_BPS,
            });
        }
        let rpc_url = parse_http_url("rpc_url", &self.rpc_url)?;
        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;

        Ok(ValidatedConfig {
            identity: NetworkIdentity {
                name: self.network,
                chain_id: self.chain_id,
                legacy: self.legacy,
            },
            rpc_url,
            root_stays_open: self.root_stays_open,
            confirmations: self.confirmations,
            artifacts: PathBuf::from(self.artifacts),
            deployments: PathBuf::from(self.deployments),
            registrar: RegistrarConfig {
                poll_interval: Duration::from_millis(self.poll_interval_ms),
                age_margin: Duration::from_secs(self.age_margin_secs),
                price_buffer_bps: self.price_buffer_bps,
            },
            log_level,
        })
    }
}

fn ensure_nonzero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(())
}

fn parse_http_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|_| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => {}
        _ => {
            return Err(ConfigError::InvalidUrlScheme {
                field,
                value: value.to_string(),
            })
        }
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
        });
    }
    Ok(url)
}

fn read_secret_file(path: &Path) -> Result<String, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptySecret {
            path: path.to_path_buf(),
        });
    }
    Ok(trimmed.to_string())
}

/// Resolve a key from, in order: the flag, the flag's file, `env_key`, the
/// file named by `env_file`. `Ok(None)` when none is set.
pub fn load_key(
    value: Option<String>,
    file: Option<PathBuf>,
    env_key: &'static str,
    env_file: &'static str,
) -> Result<Option<String>, ConfigError> {
    if let Some(value) = value {
        return Ok(Some(value));
    }
    if let Some(path) = file {
        return read_secret_file(&path).map(Some);
    }
    if let Ok(value) = env::var(env_key) {
        return Ok(Some(value));
    }
    if let Ok(path) = env::var(env_file) {
        return read_secret_file(Path::new(&path)).map(Some);
    }
    Ok(None)
}

/// Like [load_key], but the key must be present.
pub fn require_key(
    value: Option<String>,
    file: Option<PathBuf>,
    env_key: &'static str,
    env_file: &'static str,
) -> Result<String, ConfigError> {
    load_key(value, file, env_key, env_file)?
        .ok_or(ConfigError::MissingKey { env_key, env_file })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "network: localhost\nrpc_url: http://127.0.0.1:8545\nchain_id: 31337\n";

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        let validated = config.validate().unwrap();
        assert_eq!(validated.identity.name, "localhost");
        assert!(!validated.identity.legacy);
        assert!(!validated.root_stays_open);
        assert_eq!(validated.confirmations, defaults::DEFAULT_CONFIRMATIONS);
        assert_eq!(validated.deployments, PathBuf::from("deployments"));
        assert_eq!(validated.registrar.price_buffer_bps, 0);
        assert_eq!(validated.log_level, Level::INFO);
    }

    #[test]
    fn test_rejects_bad_url() {
        let yaml = "network: x\nrpc_url: ws://127.0.0.1:8545\nchain_id: 1\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrlScheme { field: "rpc_url", .. })
        ));
    }

    #[test]
    fn test_rejects_zero_confirmations() {
        let yaml = format!("{MINIMAL}confirmations: 0\n");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNonZero {
                field: "confirmations",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_excessive_buffer() {
        let yaml = format!("{MINIMAL}price_buffer_bps: 20000\n");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBps { value: 20000, .. })
        ));
    }

    #[test]
    fn test_load_key_prefers_flag_then_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");
        fs::write(&path, "  0xabc\n").unwrap();
        let key = load_key(
            Some("0xflag".to_string()),
            Some(path.clone()),
            "NAMEREG_TEST_UNSET_KEY",
            "NAMEREG_TEST_UNSET_KEY_FILE",
        )
        .unwrap();
        assert_eq!(key.as_deref(), Some("0xflag"));
        let key = load_key(
            None,
            Some(path),
            "NAMEREG_TEST_UNSET_KEY",
            "NAMEREG_TEST_UNSET_KEY_FILE",
        )
        .unwrap();
        assert_eq!(key.as_deref(), Some("0xabc"));
        assert!(matches!(
            require_key(None, None, "NAMEREG_TEST_UNSET_KEY", "NAMEREG_TEST_UNSET_KEY_FILE"),
            Err(ConfigError::MissingKey { .. })
        ));
    }
}
