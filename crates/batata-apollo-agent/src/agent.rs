//! Agent run loop with restart policy

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use batata_apollo_client::{ApolloClient, ClientConfig};
use tracing::{error, info};

use crate::env_file::EnvFileWriter;

/// What the agent runs and how it reacts to failures
#[derive(Clone, Debug)]
pub struct AgentOptions {
    pub client: ClientConfig,
    pub env_file: PathBuf,
    /// Keep listening after the first round
    pub daemon: bool,
    /// Start again after a failed run instead of returning the error
    pub restart: bool,
    pub restart_delay: Duration,
}

/// Sync the configured namespaces and keep the env file current.
pub async fn run_agent(options: AgentOptions) -> anyhow::Result<()> {
    std::fs::create_dir_all(&options.client.save_dir).with_context(|| {
        format!(
            "Failed to create save dir {}",
            options.client.save_dir.display()
        )
    })?;

    let mut client = ApolloClient::new(options.client.clone())?;
    let writer = EnvFileWriter::new(client.cache().clone(), &options.env_file);

    info!(
        server = %options.client.server_addr,
        app_id = %options.client.app_id,
        save_dir = %options.client.save_dir.display(),
        env_file = %options.env_file.display(),
        "start apollo"
    );

    loop {
        match client.run(options.daemon, Some(&writer)).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                error!("apollo error: {}", e);
                if !options.restart {
                    return Err(e.into());
                }
                tokio::time::sleep(options.restart_delay).await;
                info!("Restarting apollo sync");
            }
        }
    }
}
