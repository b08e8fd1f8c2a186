pub(crate) mod configure;
pub(crate) mod lock;
pub(crate) mod node;
pub(crate) mod session;

pub(crate) use node::NodeController;

use lock::LockError;
use shared::api::ApiError;
use shared::config::ConfigError;
use shared::models::node::ValidationError;

/// Operator-facing failures of the node commands. Engine and scheduler
/// details are logged at debug level where they are converted.
#[derive(Debug, thiserror::Error)]
pub(crate) enum NodeError {
    #[error("Failed to start the node")]
    StartFailed,
    #[error("Failed to stop the node, some resources may have to be removed manually")]
    StopFailed,
    #[error("Failed to update the node")]
    UpdateFailed,
    #[error("Failed to pull image {0}, check your network connection and the image name")]
    PullFailed(String),
    #[error("Node is not configured, run `coretex node config` first")]
    NotConfigured,
    #[error("Invalid node configuration: {0}")]
    InvalidConfiguration(#[from] ValidationError),
    #[error("{0}")]
    InvalidInput(String),
    #[error("Model {0} could not be retrieved from the platform")]
    ModelNotFound(i64),
    #[error("Failed to register node {name}: {source}")]
    Registration {
        name: String,
        #[source]
        source: ApiError,
    },
    #[error(
        "Configured {resource} ({configured}) exceeds the {available} available to Docker, \
         run `coretex node config --verbose` to adjust it"
    )]
    ResourceLimits {
        resource: &'static str,
        configured: String,
        available: String,
    },
    #[error("Failed to query Docker, make sure it is installed and running")]
    EngineUnavailable,
    #[error(transparent)]
    Locked(#[from] LockError),
    #[error("{0}")]
    Session(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartOutcome {
    Started,
    /// The operator kept the running node.
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopOutcome {
    Stopped,
    AlreadyOffline,
    /// The operator kept a busy node running.
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateOutcome {
    Updated,
    UpToDate,
    NotRunning,
    Reconnecting,
    /// The operator refused to interrupt a busy node.
    Declined,
}
