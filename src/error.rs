//! Centralized error types for shipway
//!
//! Uses thiserror for typed errors that can be matched on,
//! while still being compatible with anyhow for propagation.

use thiserror::Error;

/// Top-level error type for deployment operations
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Remote command failed with status {status}: {command}")]
    RemoteCommandFailed { command: String, status: i32 },
}

/// Remote execution channel errors (connection, auth, file transfer)
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection to remote host failed while running: {command}")]
    ChannelFailed { command: String },

    #[error("Upload failed: {local} -> {remote}: {detail}")]
    UploadFailed {
        local: String,
        remote: String,
        detail: String,
    },
}

/// Git operation errors
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Not a git repository")]
    NotARepository,

    #[error("Uncommitted changes detected")]
    DirtyWorkingTree,

    #[error("Git command failed with status {status}: {command}")]
    CommandFailed { command: String, status: i32 },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Invalid site name {site:?}: must be non-empty and contain only \
         ASCII letters, digits, '.' and '-'"
    )]
    InvalidSiteName { site: String },

    #[error("Required configuration missing: {field}")]
    MissingField { field: String },
}
