//! Error types for ferrisnap.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::artifact::ArtifactName;

/// Main error type for ferrisnap operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Artifact cycle errors
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Local storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Retention sweep errors
    #[error("Retention error: {0}")]
    Retention(#[from] RetentionError),
}

/// Transport layer errors (SSH connection, authentication, SFTP).
#[derive(Error, Debug)]
pub enum TransportError {
    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// SFTP subsystem error
    #[error("SFTP error: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host key does not match the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Host is not present in known_hosts and strict checking is on
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Session already closed
    #[error("Session not connected")]
    NotConnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by a single artifact cycle.
///
/// None of these escape the orchestrator; they are recorded in the report.
#[derive(Error, Debug)]
pub enum ArtifactError {
    /// The trigger command reported an error
    #[error("Remote command '{command}' failed: {message}")]
    RemoteCommandFailed { command: String, message: String },

    /// The trigger command may have reached the device but its outcome is
    /// unknown, so `artifact` may exist remotely
    #[error("Remote command '{command}' did not complete: {reason}")]
    TriggerUnconfirmed {
        command: String,
        artifact: ArtifactName,
        reason: String,
    },

    /// The artifact could not be copied to local storage
    #[error("Transfer of '{file}' failed: {reason}")]
    TransferFailed { file: String, reason: String },

    /// The transient remote copy could not be removed
    #[error("Removing remote '{file}' failed: {reason}")]
    RemoteCleanupFailed { file: String, reason: String },
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration document does not exist
    #[error("Configuration file '{}' not found", path.display())]
    NotFound { path: PathBuf },

    /// Configuration document could not be read
    #[error("Failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration document is not valid JSON for the expected shape
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// No devices were listed
    #[error("No routers found in configuration")]
    NoDevices,

    /// Device refers to a dialect that is not registered
    #[error("Unknown dialect '{dialect}' for device '{host}'")]
    UnknownDialect { host: String, dialect: String },

    /// Any other semantic problem with the document
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Local storage bootstrap errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A category directory could not be created
    #[error("Failed to create '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Per-file errors raised during a retention sweep.
#[derive(Error, Debug)]
pub enum RetentionError {
    /// Category directory could not be listed
    #[error("Failed to list '{}': {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File metadata (type or mtime) could not be read
    #[error("Failed to stat '{}': {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The sweep task itself did not finish
    #[error("Retention sweep aborted: {0}")]
    Aborted(#[from] tokio::task::JoinError),

    /// File could not be removed
    #[error("Error deleting old backup '{}': {source}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type alias using ferrisnap's Error.
pub type Result<T> = std::result::Result<T, Error>;
