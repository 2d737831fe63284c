//! Error types for picod
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in picod
#[derive(Debug, Error)]
pub enum PicodError {
    /// Serial device open/configure/read/write failure
    #[error("Serial error: {0}")]
    Serial(String),

    /// End of stream on a serial line; fatal to that module's poller
    #[error("Serial end of stream on {0}")]
    SerialEof(String),

    /// Malformed or unexpected bytes from a device
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IPC communication error
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Another daemon instance already owns the socket
    #[error("Server already running at {0}")]
    AlreadyRunning(String),

    /// Command registry error (bad name, frozen registry)
    #[error("Registry error: {0}")]
    Registry(String),

    /// Unknown hardware module name
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// Module activation failure
    #[error("Module error: {0}")]
    Module(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for picod operations
pub type Result<T> = std::result::Result<T, PicodError>;
