//! SSH transport layer wrapping russh and russh-sftp.
//!
//! This module provides the connection management for one device:
//! connection setup, authentication, remote command execution and the
//! SFTP sub-channel used to pull artifacts. The [`Connector`] and
//! [`RemoteSession`] traits are the seam the backup layer is written
//! against.

pub mod config;
pub mod exec;
mod ssh;

pub use config::{AuthMethod, HostKeyVerification, SshConfig, TransportSettings};
pub use exec::ExecOutput;
pub use ssh::{SshConnector, SshTransport};

use std::future::Future;

use tokio::io::AsyncWrite;

use crate::device::DeviceTarget;
use crate::error::TransportError;

/// Opens sessions to devices.
pub trait Connector: Send + Sync {
    /// Session type produced by this connector.
    type Session: RemoteSession;

    /// Connect and authenticate to `target`.
    ///
    /// On error no connection is left open.
    fn open(
        &self,
        target: &DeviceTarget,
    ) -> impl Future<Output = Result<Self::Session, TransportError>> + Send;
}

/// An authenticated session to one device.
pub trait RemoteSession: Send {
    /// Run one command and collect its output.
    ///
    /// Blocks until the device closes the command's channel. Exit codes
    /// are reported but not interpreted.
    fn execute(
        &mut self,
        command: &str,
    ) -> impl Future<Output = Result<ExecOutput, TransportError>> + Send;

    /// Size of a remote file, or `None` if it does not exist (yet).
    fn remote_size(
        &mut self,
        file: &str,
    ) -> impl Future<Output = Result<Option<u64>, TransportError>> + Send;

    /// Copy a remote file into `sink`, returning the number of bytes copied.
    fn download<W>(
        &mut self,
        file: &str,
        sink: &mut W,
    ) -> impl Future<Output = Result<u64, TransportError>> + Send
    where
        W: AsyncWrite + Unpin + Send;

    /// Release the session. Safe to call more than once.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
