//! Client configuration
//!
//! Everything the sync engine needs to talk to an Apollo config service and
//! where to keep the local cache. There is no hidden default for the save
//! directory: callers must pick one.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ClientError, Result};

pub const DEFAULT_CLUSTER: &str = "default";
pub const DEFAULT_CLIENT_IP: &str = "127.0.0.1";
pub const DEFAULT_PULL_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_INTERVAL_TIMEOUT_SECS: u64 = 65;
pub const DEFAULT_FETCH_CONCURRENCY: usize = 5;

const MIN_TIMEOUT_SECS: u64 = 1;
const MAX_TIMEOUT_SECS: u64 = 300;

/// Configuration for the Apollo client
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Config service base address, e.g. `http://127.0.0.1:8080`
    pub server_addr: String,
    /// Apollo application id
    pub app_id: String,
    /// Namespaces to keep in sync
    pub namespaces: Vec<String>,
    /// Cluster name
    pub cluster: String,
    /// Client IP sent along for gray release targeting
    pub client_ip: String,
    /// Timeout for a single namespace fetch, in seconds
    pub pull_timeout_secs: u64,
    /// Timeout for the notification long poll, in seconds
    pub interval_timeout_secs: u64,
    /// Directory holding one cached record per namespace
    pub save_dir: PathBuf,
    /// Maximum number of namespace fetches in flight during one round
    pub fetch_concurrency: usize,
}

impl ClientConfig {
    /// Create a config with the required fields; everything else takes its default.
    pub fn new<I, S>(
        server_addr: &str,
        app_id: &str,
        namespaces: I,
        save_dir: impl Into<PathBuf>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            server_addr: server_addr.to_string(),
            app_id: app_id.to_string(),
            namespaces: namespaces.into_iter().map(Into::into).collect(),
            cluster: DEFAULT_CLUSTER.to_string(),
            client_ip: DEFAULT_CLIENT_IP.to_string(),
            pull_timeout_secs: DEFAULT_PULL_TIMEOUT_SECS,
            interval_timeout_secs: DEFAULT_INTERVAL_TIMEOUT_SECS,
            save_dir: save_dir.into(),
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }

    /// Set the cluster name
    pub fn with_cluster(mut self, cluster: &str) -> Self {
        self.cluster = cluster.to_string();
        self
    }

    /// Set the client IP used for gray release
    pub fn with_client_ip(mut self, ip: &str) -> Self {
        self.client_ip = ip.to_string();
        self
    }

    /// Set the namespace fetch timeout, clamped to 1..=300 seconds
    pub fn with_pull_timeout(mut self, secs: u64) -> Self {
        self.pull_timeout_secs = clamp_timeout(secs);
        self
    }

    /// Set the long-poll timeout, clamped to 1..=300 seconds
    pub fn with_interval_timeout(mut self, secs: u64) -> Self {
        self.interval_timeout_secs = clamp_timeout(secs);
        self
    }

    /// Set how many namespace fetches may run at once (at least one)
    pub fn with_fetch_concurrency(mut self, limit: usize) -> Self {
        self.fetch_concurrency = limit.max(1);
        self
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(clamp_timeout(self.pull_timeout_secs))
    }

    pub fn interval_timeout(&self) -> Duration {
        Duration::from_secs(clamp_timeout(self.interval_timeout_secs))
    }

    /// Server address without trailing slashes
    pub fn base_url(&self) -> &str {
        self.server_addr.trim_end_matches('/')
    }

    /// Check that the required fields are present.
    pub fn validate(&self) -> Result<()> {
        if self.base_url().is_empty() {
            return Err(ClientError::InvalidConfig(
                "server address is required".to_string(),
            ));
        }
        if self.app_id.is_empty() {
            return Err(ClientError::InvalidConfig("app id is required".to_string()));
        }
        if self.namespaces.iter().all(|ns| ns.trim().is_empty()) {
            return Err(ClientError::InvalidConfig(
                "at least one namespace is required".to_string(),
            ));
        }
        if self.save_dir.as_os_str().is_empty() {
            return Err(ClientError::InvalidConfig(
                "save directory is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn clamp_timeout(secs: u64) -> u64 {
    secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)
}
