use thiserror::Error;

use chrono::{DateTime, Utc};

/// Failure taxonomy for lifecycle transitions.
///
/// Every variant maps to a stable numeric code via [`LifecycleError::code`]
/// so the transport layer can report failures without inspecting variants.
/// External faults (starter or subscriber) never propagate through here
/// uncaught; they degrade to the matching variant with the cause logged.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    #[error("Server expired at {0}")]
    Expired(DateTime<Utc>),

    #[error("Launch core {0} is not registered")]
    CoreNotFound(String),

    #[error("Starter {0} is not registered")]
    StarterNotFound(String),

    #[error("Plugin {0} rejected the transition")]
    PluginRejected(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Starter failed to launch the server")]
    LaunchFailed,

    #[error("Starter failed to stop the server")]
    StopFailed,

    #[error("Failed to deliver input to the server")]
    InputFailed,

    #[error("Server is not running")]
    NotRunning,
}

impl LifecycleError {
    pub fn code(&self) -> u16 {
        match self {
            LifecycleError::Expired(_) => 461,
            LifecycleError::CoreNotFound(_) => 462,
            LifecycleError::StarterNotFound(_) => 463,
            LifecycleError::PluginRejected(_) => 464,
            LifecycleError::LaunchFailed => 465,
            LifecycleError::StopFailed => 466,
            LifecycleError::InputFailed => 467,
            LifecycleError::NotRunning => 468,
            LifecycleError::Internal(_) => 500,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("Failed to read core definition directory")]
    DirectoryError,

    #[error("Malformed core definition: {0}")]
    Malformed(String),

    #[error("Core {0} declares config file {1} more than once")]
    DuplicateConfigFile(String, String),
}

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}")]
    ReadFailed(String),

    #[error("Failed to write config file {0}")]
    WriteFailed(String),

    #[error("Failed to create config file {0}")]
    CreateFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Failed to read instance record for server {0}")]
    ReadFailed(i64),

    #[error("Failed to write instance record for server {0}")]
    WriteFailed(i64),

    #[error("Malformed instance record: {0}")]
    Malformed(String),

    #[error("Failed to scan the servers directory")]
    DirectoryError,
}

/// Fault raised by an event subscriber; the bus treats it as a `false` verdict.
#[derive(Debug, Clone, Error)]
pub enum SubscriberError {
    #[error("Subscriber fault: {0}")]
    Fault(String),
}

#[derive(Debug, Clone, Error)]
pub enum StarterError {
    #[error("Server is already running")]
    AlreadyRunning,

    #[error("Server is not running")]
    NotRunning,

    #[error("Failed to spawn server process")]
    SpawnFailed,

    #[error("Failed to access child stdout pipe")]
    NoStdoutPipe,

    #[error("Failed to access child stdin pipe")]
    NoStdinPipe,

    #[error("Failed to access child stderr pipe")]
    NoStderrPipe,

    #[error("Failed to write to stdin")]
    StdinWriteFailed,

    #[error("Starter fault: {0}")]
    Fault(String),
}
