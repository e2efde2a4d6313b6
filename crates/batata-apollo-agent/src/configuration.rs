//! Configuration management for the Apollo agent
//!
//! Settings are layered: optional config file, then `APOLLO_*` environment
//! variables, then command line flags.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use batata_apollo_client::ClientConfig;
use batata_apollo_client::config::{
    DEFAULT_CLIENT_IP, DEFAULT_CLUSTER, DEFAULT_INTERVAL_TIMEOUT_SECS, DEFAULT_PULL_TIMEOUT_SECS,
};
use clap::Parser;
use config::{Config, Environment};

use crate::agent::AgentOptions;

pub const DEFAULT_CONFIG_FILE: &str = "conf/apollo-agent.yml";
pub const DEFAULT_NAMESPACES: &str = "application";
pub const DEFAULT_SAVE_DIR: &str = "storage/apollo";
pub const DEFAULT_ENV_FILE: &str = ".env";
pub const DEFAULT_RESTART_DELAY_SECS: u64 = 5;

const SERVER: &str = "server";
const APP_ID: &str = "app_id";
const NAMESPACES: &str = "namespaces";
const DAEMON: &str = "daemon";
const CLUSTER: &str = "cluster";
const CLIENT_IP: &str = "ip";
const PULL_TIMEOUT: &str = "pull_timeout";
const INTERVAL_TIMEOUT: &str = "interval_timeout";
const SAVE_DIR: &str = "save_dir";
const ENV_FILE: &str = "env_file";
const RESTART: &str = "restart";
const RESTART_DELAY: &str = "restart_delay";

/// Command line arguments for the agent
#[derive(Debug, Parser)]
#[command(name = "apollo-agent", about = "Apollo Config Client", version)]
pub struct Cli {
    /// Apollo config service address
    #[arg(long)]
    pub server: Option<String>,
    /// Apollo application id
    #[arg(long = "appid")]
    pub app_id: Option<String>,
    /// Comma separated namespaces
    #[arg(long)]
    pub namespaces: Option<String>,
    /// Keep listening for changes instead of syncing once
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub daemon: Option<bool>,
    #[arg(long)]
    pub cluster: Option<String>,
    /// Client IP used for gray release
    #[arg(long)]
    pub ip: Option<String>,
    /// Namespace pull timeout in seconds (1-300)
    #[arg(long)]
    pub pull_timeout: Option<u64>,
    /// Long poll timeout in seconds (1-300)
    #[arg(long)]
    pub interval_timeout: Option<u64>,
    /// Directory for cached namespace configs
    #[arg(long)]
    pub save_dir: Option<PathBuf>,
    /// Env file rebuilt after each change
    #[arg(long)]
    pub env_file: Option<PathBuf>,
    /// Start syncing again after a failure
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub restart: Option<bool>,
    /// Seconds to wait before restarting
    #[arg(long)]
    pub restart_delay: Option<u64>,
    /// Optional config file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,
}

/// Agent configuration loaded from config file, environment and command line
#[derive(Clone, Debug)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn new(cli: Cli) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .add_source(config::File::with_name(&cli.config_file).required(false))
            .add_source(Environment::with_prefix("APOLLO").try_parsing(true));

        if let Some(v) = cli.server {
            builder = builder.set_override(SERVER, v)?;
        }
        if let Some(v) = cli.app_id {
            builder = builder.set_override(APP_ID, v)?;
        }
        if let Some(v) = cli.namespaces {
            builder = builder.set_override(NAMESPACES, v)?;
        }
        if let Some(v) = cli.daemon {
            builder = builder.set_override(DAEMON, v)?;
        }
        if let Some(v) = cli.cluster {
            builder = builder.set_override(CLUSTER, v)?;
        }
        if let Some(v) = cli.ip {
            builder = builder.set_override(CLIENT_IP, v)?;
        }
        if let Some(v) = cli.pull_timeout {
            builder = builder.set_override(PULL_TIMEOUT, v as i64)?;
        }
        if let Some(v) = cli.interval_timeout {
            builder = builder.set_override(INTERVAL_TIMEOUT, v as i64)?;
        }
        if let Some(v) = cli.save_dir {
            builder = builder.set_override(SAVE_DIR, v.to_string_lossy().into_owned())?;
        }
        if let Some(v) = cli.env_file {
            builder = builder.set_override(ENV_FILE, v.to_string_lossy().into_owned())?;
        }
        if let Some(v) = cli.restart {
            builder = builder.set_override(RESTART, v)?;
        }
        if let Some(v) = cli.restart_delay {
            builder = builder.set_override(RESTART_DELAY, v as i64)?;
        }

        Ok(Configuration {
            config: builder.build()?,
        })
    }

    pub fn server(&self) -> Option<String> {
        self.config.get_string(SERVER).ok().filter(|s| !s.is_empty())
    }

    pub fn app_id(&self) -> Option<String> {
        self.config.get_string(APP_ID).ok().filter(|s| !s.is_empty())
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.config
            .get_string(NAMESPACES)
            .unwrap_or_else(|_| DEFAULT_NAMESPACES.to_string())
            .split(',')
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn daemon(&self) -> bool {
        self.config.get_bool(DAEMON).unwrap_or(false)
    }

    pub fn cluster(&self) -> String {
        self.config
            .get_string(CLUSTER)
            .unwrap_or_else(|_| DEFAULT_CLUSTER.to_string())
    }

    pub fn client_ip(&self) -> String {
        self.config
            .get_string(CLIENT_IP)
            .unwrap_or_else(|_| DEFAULT_CLIENT_IP.to_string())
    }

    pub fn pull_timeout(&self) -> u64 {
        self.config
            .get_int(PULL_TIMEOUT)
            .map(|v| v.max(0) as u64)
            .unwrap_or(DEFAULT_PULL_TIMEOUT_SECS)
    }

    pub fn interval_timeout(&self) -> u64 {
        self.config
            .get_int(INTERVAL_TIMEOUT)
            .map(|v| v.max(0) as u64)
            .unwrap_or(DEFAULT_INTERVAL_TIMEOUT_SECS)
    }

    pub fn save_dir(&self) -> PathBuf {
        self.config
            .get_string(SAVE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SAVE_DIR))
    }

    pub fn env_file(&self) -> PathBuf {
        self.config
            .get_string(ENV_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ENV_FILE))
    }

    pub fn restart(&self) -> bool {
        self.config.get_bool(RESTART).unwrap_or(false)
    }

    pub fn restart_delay(&self) -> u64 {
        self.config
            .get_int(RESTART_DELAY)
            .map(|v| v.max(0) as u64)
            .unwrap_or(DEFAULT_RESTART_DELAY_SECS)
    }

    /// Build the client config, failing when server, app id or namespaces are missing.
    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let namespaces = self.namespaces();
        let (Some(server), Some(app_id)) = (self.server(), self.app_id()) else {
            bail!("server, appid, namespaces must be specified");
        };
        if namespaces.is_empty() {
            bail!("server, appid, namespaces must be specified");
        }

        Ok(ClientConfig::new(&server, &app_id, namespaces, self.save_dir())
            .with_cluster(&self.cluster())
            .with_client_ip(&self.client_ip())
            .with_pull_timeout(self.pull_timeout())
            .with_interval_timeout(self.interval_timeout()))
    }

    /// Everything `run_agent` needs.
    pub fn agent_options(&self) -> anyhow::Result<AgentOptions> {
        Ok(AgentOptions {
            client: self.client_config()?,
            env_file: self.env_file(),
            daemon: self.daemon(),
            restart: self.restart(),
            restart_delay: Duration::from_secs(self.restart_delay()),
        })
    }
}
