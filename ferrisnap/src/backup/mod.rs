//! Backup orchestration across a fleet of devices.
//!
//! For each device the orchestrator opens a session, runs the binary and
//! then the plaintext artifact cycle, and closes the session. A device that
//! cannot be reached is skipped; a failed cycle is recorded and the next one
//! still runs. Nothing below this layer can abort the batch.
//!
//! # Example
//!
//! ```rust,no_run
//! use ferrisnap::{BackupOrchestrator, SshConnector, StorageLayout, RetentionPolicy};
//! use ferrisnap::transport::TransportSettings;
//!
//! # async fn example(targets: Vec<ferrisnap::DeviceTarget>) -> Result<(), ferrisnap::Error> {
//! let layout = StorageLayout::new("mikrotik_backups");
//! layout.ensure()?;
//!
//! let orchestrator = BackupOrchestrator::new(SshConnector::new(TransportSettings::default()), layout);
//! let report = orchestrator.execute(&targets, Some(RetentionPolicy::new(30))).await;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

mod report;

pub use report::{ArtifactReport, DeviceReport, RunReport};

use chrono::{DateTime, Local};
use futures_util::stream::{self, StreamExt};
use log::{info, warn};

use crate::artifact::{ArtifactProducer, ArtifactRetriever, ArtifactSpec, SettlePolicy};
use crate::device::DeviceTarget;
use crate::error::{ArtifactError, RetentionError};
use crate::retention::{self, RetentionPolicy, SweepReport};
use crate::storage::StorageLayout;
use crate::transport::{Connector, RemoteSession};

/// Runs backups for a list of devices and aggregates a [`RunReport`].
pub struct BackupOrchestrator<C> {
    connector: C,
    layout: StorageLayout,
    settle: SettlePolicy,
    concurrency: usize,
    clock: fn() -> DateTime<Local>,
}

impl<C: Connector> BackupOrchestrator<C> {
    /// Create an orchestrator storing artifacts under `layout`.
    ///
    /// Devices are processed one at a time unless
    /// [`with_concurrency`](Self::with_concurrency) says otherwise.
    pub fn new(connector: C, layout: StorageLayout) -> Self {
        Self {
            connector,
            layout,
            settle: SettlePolicy::default(),
            concurrency: 1,
            clock: Local::now,
        }
    }

    /// Set how produced artifacts are waited for.
    pub fn with_settle(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    /// Process up to `concurrency` devices at once (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Replace the clock used for artifact timestamps.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Local>) -> Self {
        self.clock = clock;
        self
    }

    /// Storage layout artifacts are written to.
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Back up every device, then sweep storage if a policy is given.
    ///
    /// The sweep starts only after every device has finished, so it never
    /// sees a file that is still being written.
    pub async fn execute(
        &self,
        targets: &[DeviceTarget],
        retention: Option<RetentionPolicy>,
    ) -> RunReport {
        let devices = self.run(targets).await;

        let retention = match retention {
            Some(policy) => Some(self.sweep(policy).await),
            None => None,
        };

        RunReport { devices, retention }
    }

    async fn sweep(&self, policy: RetentionPolicy) -> SweepReport {
        info!("Checking for old backups (older than {} days)", policy.max_age_days);
        let layout = self.layout.clone();
        tokio::task::spawn_blocking(move || retention::sweep(&layout, policy))
            .await
            .unwrap_or_else(|e| SweepReport {
                deleted: vec![],
                failures: vec![RetentionError::from(e)],
            })
    }

    /// Back up every device. Reports come back in the order of `targets`.
    pub async fn run(&self, targets: &[DeviceTarget]) -> Vec<DeviceReport> {
        stream::iter(targets)
            .map(|target| self.backup_device(target))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Back up one device: connect, both artifact cycles, close.
    pub async fn backup_device(&self, target: &DeviceTarget) -> DeviceReport {
        info!("Processing router: {}", target.host);

        let mut session = match self.connector.open(target).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Failed to connect to router {}: {}", target.host, e);
                return DeviceReport::unreachable(&target.host, e);
            }
        };

        let mut artifacts = Vec::with_capacity(2);
        for spec in self.layout.specs() {
            artifacts.push(self.run_cycle(&mut session, target, &spec).await);
        }

        let close_error = session.close().await.err();
        if let Some(e) = &close_error {
            warn!("Closing session to {} failed: {}", target.host, e);
        }

        DeviceReport {
            host: target.host.clone(),
            connection_error: None,
            artifacts,
            close_error,
        }
    }

    async fn run_cycle<S: RemoteSession>(
        &self,
        session: &mut S,
        target: &DeviceTarget,
        spec: &ArtifactSpec,
    ) -> ArtifactReport {
        let now = (self.clock)();
        let produced = match ArtifactProducer::new(&target.dialect, &self.settle)
            .produce(session, spec, &target.host, &now)
            .await
        {
            Ok(produced) => produced,
            Err(e) => {
                warn!("Error creating {} backup on {}: {}", spec.kind, target.host, e);
                let cleanup = match &e {
                    ArtifactError::TriggerUnconfirmed { artifact, .. } => Some(
                        ArtifactRetriever::new(&target.dialect)
                            .remove(session, artifact)
                            .await,
                    ),
                    _ => None,
                };
                return ArtifactReport {
                    kind: spec.kind,
                    outcome: Err(e),
                    cleanup,
                };
            }
        };

        let retrieval = ArtifactRetriever::new(&target.dialect)
            .retrieve(session, &produced, &spec.local_dir)
            .await;

        ArtifactReport {
            kind: spec.kind,
            outcome: retrieval.local,
            cleanup: Some(retrieval.cleanup),
        }
    }
}
