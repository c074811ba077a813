//! Environment-driven process configuration, shared by the node, cluster, and self-test
//! binaries. Construction is fallible and never panics outside of `main`.

use std::path::PathBuf;
use std::time::Duration;

#[derive(thiserror::Error, displaydoc::Display, Debug)]
pub enum ConfigError {
    /// missing required env var `{0}`
    Missing(&'static str),
    /// env var `{0}` has an invalid value `{1}`: {2}
    Invalid(&'static str, String, anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Node,
    Cluster,
}

/// Process-wide configuration. Every field has an environment variable and a default, except
/// `nodes_file`, which is required when running as [`Role::Cluster`].
#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub work_dir: PathBuf,
    pub bind_addr: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub nodes_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env(role: Role) -> Result<Self, ConfigError> {
        let work_dir = env_or("BUNDLE_WORK_DIR", "./bundles")?.into();
        let bind_addr = format!(
            "{}:{}",
            env_or("BIND_IP", "0.0.0.0")?,
            env_or("PORT", "8080")?
        );
        let request_timeout = parse_secs("REQUEST_TIMEOUT_SECS", 30)?;
        let poll_interval = parse_secs("POLL_INTERVAL_SECS", 2)?;

        let nodes_file = match role {
            Role::Cluster => Some(PathBuf::from(required_env("NODES_FILE")?)),
            Role::Node => std::env::var("NODES_FILE").ok().map(PathBuf::from),
        };

        Ok(Self {
            role,
            work_dir,
            bind_addr,
            request_timeout,
            poll_interval,
            nodes_file,
        })
    }
}

fn env_or(key: &'static str, default: &str) -> Result<String, ConfigError> {
    Ok(std::env::var(key).unwrap_or_else(|_| default.to_string()))
}

fn required_env(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn parse_secs(key: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let raw = env_or(key, &default.to_string())?;
    let secs: u64 = raw
        .parse()
        .map_err(|e| ConfigError::Invalid(key, raw.clone(), anyhow::Error::new(e)))?;
    Ok(Duration::from_secs(secs))
}
