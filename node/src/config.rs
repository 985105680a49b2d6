//! Configuration management for the node.

use std::env;
use std::time::Duration;

use waypost_engine::{MediaResolver, NodeRole};

/// Node configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Control surface host address
    pub host: String,
    /// Control surface port
    pub port: u16,
    /// SQLite URL of the local cache
    pub database_url: String,
    /// Base URL of the remote document store
    pub remote_url: String,
    /// Remote collection holding the listings
    pub remote_collection: String,
    /// Origin prepended to root-relative media paths
    pub media_base_origin: Option<String>,
    /// Host identity this node runs under
    pub node_identity: String,
    /// Identities that make a node primary
    pub primary_identities: Vec<String>,
    pub poll_interval: Duration,
    pub probe_interval: Duration,
    /// Bearer secret for control endpoints; open access when unset
    pub auth_secret: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://waypost.db?mode=rwc".to_string());

        let remote_url = lookup("REMOTE_URL").ok_or(ConfigError::MissingRemoteUrl)?;
        let remote_collection =
            lookup("REMOTE_COLLECTION").unwrap_or_else(|| "listings".to_string());

        let media_base_origin = lookup("MEDIA_BASE_ORIGIN").filter(|s| !s.trim().is_empty());

        let node_identity = lookup("NODE_IDENTITY")
            .or_else(|| lookup("HOSTNAME"))
            .unwrap_or_else(|| "localhost".to_string());

        let primary_identities = lookup("PRIMARY_IDENTITIES")
            .unwrap_or_else(|| "localhost,127.0.0.1".to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let poll_interval = millis(&lookup, "POLL_INTERVAL_MS", 5_000)?;
        let probe_interval = millis(&lookup, "PROBE_INTERVAL_MS", 15_000)?;

        let auth_secret = lookup("AUTH_SECRET");

        let config = Self {
            host,
            port,
            database_url,
            remote_url,
            remote_collection,
            media_base_origin,
            node_identity,
            primary_identities,
            poll_interval,
            probe_interval,
            auth_secret,
        };
        config.media_resolver()?;
        Ok(config)
    }

    /// Role derived from the node identity.
    pub fn role(&self) -> NodeRole {
        NodeRole::detect(&self.node_identity, &self.primary_identities)
    }

    pub fn media_resolver(&self) -> Result<MediaResolver, ConfigError> {
        match &self.media_base_origin {
            Some(origin) => MediaResolver::new(origin.clone())
                .map_err(|e| ConfigError::InvalidMediaOrigin(e.to_string())),
            None => Ok(MediaResolver::passthrough()),
        }
    }
}

fn millis<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidNumber(key)),
        None => Ok(Duration::from_millis(default)),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("REMOTE_URL environment variable is required")]
    MissingRemoteUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid {0} value")]
    InvalidNumber(&'static str),

    #[error("Invalid MEDIA_BASE_ORIGIN: {0}")]
    InvalidMediaOrigin(String),
}
