//! # Ferrisnap
//!
//! Async SSH configuration backup for fleets of network devices.
//!
//! For every device ferrisnap opens an SSH session, asks the device for a
//! binary snapshot and a plaintext export, pulls both over SFTP, removes the
//! transient copies from the device and finally applies an age-based
//! retention policy to local storage.
//!
//! ## Features
//!
//! - Async SSH and SFTP via russh and russh-sftp
//! - Templated device commands per firmware dialect (RouterOS built in)
//! - Poll-based readiness check before each download
//! - Per-device failure isolation with a structured run report
//! - Optional bounded concurrency across devices
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferrisnap::{BackupConfig, BackupOrchestrator, SshConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ferrisnap::Error> {
//!     let config = BackupConfig::load("config.json")?;
//!     config.storage.ensure()?;
//!
//!     let orchestrator = BackupOrchestrator::new(
//!         SshConnector::new(config.transport.clone()),
//!         config.storage.clone(),
//!     )
//!     .with_settle(config.settle.clone())
//!     .with_concurrency(config.concurrency);
//!
//!     let report = orchestrator
//!         .execute(&config.devices, Some(config.retention))
//!         .await;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod backup;
pub mod config;
pub mod device;
pub mod error;
pub mod platform;
pub mod retention;
pub mod storage;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use artifact::{ArtifactKind, ArtifactName, SettlePolicy};
pub use backup::{ArtifactReport, BackupOrchestrator, DeviceReport, RunReport};
pub use config::BackupConfig;
pub use device::{Credentials, DeviceTarget};
pub use error::Error;
pub use platform::{Dialect, DialectRegistry};
pub use retention::{RetentionPolicy, SweepReport};
pub use storage::StorageLayout;
pub use transport::{Connector, RemoteSession, SshConnector};
