//! Default values for [crate::config::Config].

pub const DEFAULT_CONFIRMATIONS: usize = 1;
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
pub const DEFAULT_DEPLOYMENTS_DIR: &str = "deployments";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_AGE_MARGIN_SECS: u64 = 2;
pub const DEFAULT_PRICE_BUFFER_BPS: u32 = 0;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Headroom above 100% is accepted up to this many basis points.
pub const MAX_PRICE_BUFFER_BPS: u32 = 10_000;

pub const DEPLOYER_KEY_ENV: &str = "DEPLOYER_PRIVATE_KEY";
pub const DEPLOYER_KEY_FILE_ENV: &str = "DEPLOYER_PRIVATE_KEY_FILE";
pub const OWNER_KEY_ENV: &str = "OWNER_PRIVATE_KEY";
pub const OWNER_KEY_FILE_ENV: &str = "OWNER_PRIVATE_KEY_FILE";
