//! Client error types for the Apollo client

/// Error type for Apollo client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server rejected request: status={status}, body={body}")]
    ServerRejected { status: u16, body: String },

    #[error("failed to write cache for namespace {namespace}: {source}")]
    StorageWrite {
        namespace: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("apollo error: {0}")]
    Server(String),

    #[error("change listener failed: {0}")]
    Callback(#[source] anyhow::Error),

    #[error("invalid client config: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// Whether this failure came from reaching the server rather than from its answer.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
