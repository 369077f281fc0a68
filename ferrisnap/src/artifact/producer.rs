//! Artifact production: trigger the device-side command and wait for the file.

use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use tokio::time::Instant;

use super::{ArtifactName, ArtifactSpec};
use crate::error::ArtifactError;
use crate::platform::Dialect;
use crate::transport::RemoteSession;

/// How to wait for a triggered artifact to be fully written on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlePolicy {
    /// Sleep for a fixed delay and assume the file is complete.
    Fixed(Duration),

    /// Stat the file over SFTP every `interval` until it exists with a
    /// non-zero size that is unchanged since the previous poll, giving up
    /// after `timeout`.
    Poll { interval: Duration, timeout: Duration },
}

impl SettlePolicy {
    /// Fixed delay matching what RouterOS needs in practice.
    pub const DEFAULT_FIXED_DELAY: Duration = Duration::from_secs(2);
}

impl Default for SettlePolicy {
    fn default() -> Self {
        SettlePolicy::Poll {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// How sure we are that a produced artifact is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Observed on the device with a stable size.
    Confirmed { size: u64 },
    /// Fixed settle delay elapsed; not observed.
    Assumed,
    /// Polling gave up after the given bound.
    TimedOut(Duration),
}

/// An artifact whose trigger command succeeded.
///
/// From here on the remote file is believed to exist (or to be about to),
/// so the retriever owes it exactly one removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedArtifact {
    /// Artifact name.
    pub name: ArtifactName,

    /// Trigger command that was sent.
    pub command: String,

    /// Outcome of the settle wait.
    pub readiness: Readiness,
}

impl ProducedArtifact {
    /// Remote (and local) file name.
    pub fn file_name(&self) -> String {
        self.name.file_name()
    }

    /// Whether retrieval should be attempted.
    pub fn is_ready(&self) -> bool {
        !matches!(self.readiness, Readiness::TimedOut(_))
    }
}

/// Drives the trigger commands of one dialect.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactProducer<'a> {
    dialect: &'a Dialect,
    settle: &'a SettlePolicy,
}

impl<'a> ArtifactProducer<'a> {
    /// Create a producer for `dialect` that settles according to `settle`.
    pub fn new(dialect: &'a Dialect, settle: &'a SettlePolicy) -> Self {
        Self { dialect, settle }
    }

    /// Trigger the artifact for `host` and wait for it to materialize.
    ///
    /// Returns `RemoteCommandFailed` when the trigger reports an error; no
    /// remote file is assumed to exist in that case. When the executor
    /// itself fails the command may still have run, which is reported as
    /// `TriggerUnconfirmed` carrying the artifact name for cleanup.
    pub async fn produce<S: RemoteSession>(
        &self,
        session: &mut S,
        spec: &ArtifactSpec,
        host: &str,
        at: &DateTime<Local>,
    ) -> Result<ProducedArtifact, ArtifactError> {
        let name = ArtifactName::new(host, spec.kind, at);
        let file = name.file_name();
        let command = self.dialect.trigger_command(spec.kind, name.base(), &file);

        info!("Creating {} backup {} on {}", spec.kind, file, host);

        let output = session
            .execute(&command)
            .await
            .map_err(|e| ArtifactError::TriggerUnconfirmed {
                command: command.clone(),
                artifact: name.clone(),
                reason: e.to_string(),
            })?;

        if let Some(message) = output.failure(&self.dialect.failed_when_contains) {
            return Err(ArtifactError::RemoteCommandFailed { command, message });
        }

        let readiness = self.settle(session, &file).await;
        match readiness {
            Readiness::Confirmed { size } => debug!("{} on {} is ready ({} bytes)", file, host, size),
            Readiness::Assumed => debug!("{} on {} assumed ready after settle delay", file, host),
            Readiness::TimedOut(bound) => {
                warn!("{} on {} did not materialize within {:?}", file, host, bound)
            }
        }

        Ok(ProducedArtifact {
            name,
            command,
            readiness,
        })
    }

    async fn settle<S: RemoteSession>(&self, session: &mut S, file: &str) -> Readiness {
        let (interval, timeout) = match *self.settle {
            SettlePolicy::Fixed(delay) => {
                tokio::time::sleep(delay).await;
                return Readiness::Assumed;
            }
            SettlePolicy::Poll { interval, timeout } => (interval, timeout),
        };

        let deadline = Instant::now() + timeout;
        let mut last_size = None;

        loop {
            match tokio::time::timeout_at(deadline, session.remote_size(file)).await {
                Err(_) => return Readiness::TimedOut(timeout),
                Ok(Ok(Some(size))) if size > 0 && last_size == Some(size) => {
                    return Readiness::Confirmed { size };
                }
                Ok(Ok(size)) => last_size = size,
                Ok(Err(e)) => {
                    debug!("Polling {} failed: {}", file, e);
                    last_size = None;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Readiness::TimedOut(timeout);
            }
            tokio::time::sleep_until((now + interval).min(deadline)).await;
        }
    }
}
