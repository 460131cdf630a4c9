//! Runtime settings: command-line values with environment fallbacks.
//!
//! `.env` is loaded by `main` through `dotenvy` before anything is read here.

use std::time::Duration;

pub const ENV_RPC_URL: &str = "RPC_URL";
pub const ENV_PROVIDER: &str = "PROVIDER";
pub const ENV_ORIGIN: &str = "BDP_ORIGIN";
pub const ENV_SPOOL_DIR: &str = "SPOOL_DIR";
pub const ENV_S3_BUCKET: &str = "S3_BUCKET";

pub const DEFAULT_PROVIDER: &str = "famas/parking";
pub const DEFAULT_ORIGIN: &str = "FAMAS";
pub const DEFAULT_SPOOL_DIR: &str = "spool";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting: pass --{flag} or set {var}")]
    Missing { flag: &'static str, var: &'static str },
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Settings of one collection run.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    pub rpc_url: String,
    pub provider: String,
    pub spool_dir: String,
    pub s3_bucket: Option<String>,
    pub s3_prefix: String,
    pub gzip: bool,
    pub request_timeout: Duration,
    pub cycle_timeout: Duration,
}

/// Command-line values for a collection run, before env fallbacks.
#[derive(Debug, Clone, Default)]
pub struct CollectorArgs {
    pub rpc_url: Option<String>,
    pub provider: Option<String>,
    pub spool_dir: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_prefix: String,
    pub gzip: bool,
    pub timeout_secs: u64,
    pub cycle_timeout_secs: u64,
}

impl CollectorConfig {
    pub fn from_env(args: CollectorArgs) -> Result<Self, ConfigError> {
        Self::resolve(args, |var| std::env::var(var).ok())
    }

    /// Fills unset values through `lookup` (normally the process environment).
    pub fn resolve(
        args: CollectorArgs,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let setting = |arg: Option<String>, var: &str| {
            arg.or_else(|| lookup(var))
                .filter(|v| !v.trim().is_empty())
        };

        let rpc_url = setting(args.rpc_url, ENV_RPC_URL).ok_or(ConfigError::Missing {
            flag: "rpc-url",
            var: ENV_RPC_URL,
        })?;
        if args.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout-secs", "must be positive".into()));
        }
        if args.cycle_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "cycle-timeout-secs",
                "must be positive".into(),
            ));
        }

        Ok(Self {
            rpc_url,
            provider: setting(args.provider, ENV_PROVIDER)
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            spool_dir: setting(args.spool_dir, ENV_SPOOL_DIR)
                .unwrap_or_else(|| DEFAULT_SPOOL_DIR.to_string()),
            s3_bucket: setting(args.s3_bucket, ENV_S3_BUCKET),
            s3_prefix: args.s3_prefix,
            gzip: args.gzip,
            request_timeout: Duration::from_secs(args.timeout_secs),
            cycle_timeout: Duration::from_secs(args.cycle_timeout_secs),
        })
    }
}

/// Origin tag written on station descriptors.
pub fn origin(arg: Option<String>) -> String {
    arg.or_else(|| std::env::var(ENV_ORIGIN).ok())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ORIGIN.to_string())
}
