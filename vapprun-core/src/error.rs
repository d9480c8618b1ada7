//! Error types for vapprun.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vapprun operations.
pub type Result<T> = std::result::Result<T, VappError>;

/// Main error type for vapprun.
#[derive(Error, Debug)]
pub enum VappError {
    // Configuration errors
    #[error("Invalid configuration in {path:?}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("Unsupported workspace format: {version} (supported version: {supported})")]
    UnsupportedConfigVersion { version: String, supported: String },

    #[error("Cannot parse {path:?}: {reason}")]
    Xml { path: PathBuf, reason: String },

    #[error("Invalid expression '{expression}' for property '{key}'")]
    InvalidExpression { key: String, expression: String },

    #[error("Undefined reference '{reference}' for property '{key}'")]
    UndefinedReference { key: String, reference: String },

    #[error("Invalid network name '{network}' for property '{key}' (it must be 'Network')")]
    InvalidNetworkName { key: String, network: String },

    #[error("Invalid IP pool range '{range}'")]
    InvalidPoolRange { range: String },

    #[error("No vapprun workspace found (looked for {file} from {start:?} upwards)")]
    WorkspaceNotFound { start: PathBuf, file: String },

    // Resource errors
    #[error("IP property {key} has no value")]
    MissingIpValue { key: String },

    #[error("No IP addresses left in IP pool")]
    IpPoolExhausted,

    // Inventory errors
    #[error("Entity not found: {name}")]
    EntityNotFound { name: String },

    // Lifecycle errors
    #[error("{name}: Already running")]
    AlreadyRunning { name: String },

    #[error("{name}: Already stopped")]
    AlreadyStopped { name: String },

    #[error("No cdrom device found for OVF environment in VM {vmx:?}")]
    NoCdromDevice { vmx: PathBuf },

    // External tools
    #[error("Failed to execute {command}. Is it in your path?")]
    CommandNotFound { command: String },

    #[error("Command {command} failed: {reason}")]
    CommandFailed { command: String, reason: String },

    // File system errors
    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VappError {
    /// Create an I/O error bound to a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError { path: path.into(), source }
    }

    /// Whether the error must abort the whole invocation.
    ///
    /// Starting a running entity or stopping a stopped one is reported to the
    /// user but does not fail the command.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::AlreadyRunning { .. } | Self::AlreadyStopped { .. })
    }
}
