//! Batata Apollo Agent
//!
//! Command line wrapper around `batata-apollo-client`: loads settings, sets up
//! logging, syncs namespaces and writes the merged configuration to an env file.

pub mod agent;
pub mod configuration;
pub mod env_file;
pub mod logging;

pub use agent::{AgentOptions, run_agent};
pub use configuration::{Cli, Configuration};
pub use env_file::EnvFileWriter;
pub use logging::{LoggingConfig, init_logging};
