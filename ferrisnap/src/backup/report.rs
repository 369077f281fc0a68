//! Structured results of a backup run.

use std::fmt;
use std::path::PathBuf;

use crate::artifact::ArtifactKind;
use crate::error::{ArtifactError, TransportError};
use crate::retention::SweepReport;

/// Result of one artifact cycle on one device.
#[derive(Debug)]
pub struct ArtifactReport {
    /// Artifact category.
    pub kind: ArtifactKind,

    /// Local path of the stored artifact, or why there is none.
    pub outcome: Result<PathBuf, ArtifactError>,

    /// Remote cleanup outcome. `None` when the trigger reported an error
    /// and no remote file was created.
    pub cleanup: Option<Result<(), ArtifactError>>,
}

impl ArtifactReport {
    /// Whether the artifact was stored locally.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Everything that happened to one device.
#[derive(Debug)]
pub struct DeviceReport {
    /// Device host.
    pub host: String,

    /// Connection failure, if the device could not be reached.
    pub connection_error: Option<TransportError>,

    /// One entry per attempted artifact cycle, in production order.
    pub artifacts: Vec<ArtifactReport>,

    /// Error raised while releasing the session.
    pub close_error: Option<TransportError>,
}

impl DeviceReport {
    pub(crate) fn unreachable(host: impl Into<String>, error: TransportError) -> Self {
        Self {
            host: host.into(),
            connection_error: Some(error),
            artifacts: vec![],
            close_error: None,
        }
    }

    /// Whether the device was connected to.
    pub fn connected(&self) -> bool {
        self.connection_error.is_none()
    }

    /// Report for a given artifact kind, if its cycle ran.
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&ArtifactReport> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }

    /// Whether every step succeeded, cleanup included.
    pub fn is_clean(&self) -> bool {
        self.connected()
            && self.close_error.is_none()
            && self
                .artifacts
                .iter()
                .all(|a| a.is_success() && matches!(a.cleanup, Some(Ok(())) | None))
    }
}

impl fmt::Display for DeviceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Router {}:", self.host)?;
        if let Some(e) = &self.connection_error {
            return writeln!(f, "  Failed to connect: {}", e);
        }

        for artifact in &self.artifacts {
            match &artifact.outcome {
                Ok(path) => writeln!(
                    f,
                    "  {} backup downloaded: {}",
                    artifact.kind,
                    path.display()
                )?,
                Err(e) => writeln!(f, "  {} backup failed: {}", artifact.kind, e)?,
            }
            if let Some(Err(e)) = &artifact.cleanup {
                writeln!(f, "  {} cleanup failed: {}", artifact.kind, e)?;
            }
        }

        if let Some(e) = &self.close_error {
            writeln!(f, "  Closing session failed: {}", e)?;
        }
        Ok(())
    }
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Per-device reports, in configuration order.
    pub devices: Vec<DeviceReport>,

    /// Retention sweep, when one ran.
    pub retention: Option<SweepReport>,
}

impl RunReport {
    /// Number of artifacts stored locally.
    pub fn stored(&self) -> usize {
        self.devices
            .iter()
            .flat_map(|d| &d.artifacts)
            .filter(|a| a.is_success())
            .count()
    }

    /// Whether anything failed, including best-effort cleanup.
    pub fn has_failures(&self) -> bool {
        self.devices.iter().any(|d| !d.is_clean())
            || self.retention.as_ref().is_some_and(|r| r.has_failures())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for device in &self.devices {
            write!(f, "{}", device)?;
        }
        if let Some(retention) = &self.retention {
            write!(f, "{}", retention)?;
        }
        let failed = self.devices.iter().filter(|d| !d.is_clean()).count();
        writeln!(
            f,
            "{} device(s), {} artifact(s) stored, {} device(s) with failures",
            self.devices.len(),
            self.stored(),
            failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(kind: ArtifactKind, path: &str) -> ArtifactReport {
        ArtifactReport {
            kind,
            outcome: Ok(PathBuf::from(path)),
            cleanup: Some(Ok(())),
        }
    }

    #[test]
    fn test_unreachable_device() {
        let report = DeviceReport::unreachable(
            "r1",
            TransportError::AuthenticationFailed {
                user: "admin".to_string(),
            },
        );
        assert!(!report.connected());
        assert!(!report.is_clean());
        assert_eq!(
            report.to_string(),
            "Router r1:\n  Failed to connect: Authentication failed for user 'admin'\n"
        );
    }

    #[test]
    fn test_cleanup_failure_is_not_clean_but_stored() {
        let report = DeviceReport {
            host: "r1".to_string(),
            connection_error: None,
            artifacts: vec![ArtifactReport {
                kind: ArtifactKind::Binary,
                outcome: Ok(PathBuf::from("b/r1.backup")),
                cleanup: Some(Err(ArtifactError::RemoteCleanupFailed {
                    file: "r1.backup".to_string(),
                    reason: "busy".to_string(),
                })),
            }],
            close_error: None,
        };
        assert!(report.artifact(ArtifactKind::Binary).unwrap().is_success());
        assert!(!report.is_clean());
        assert!(report.to_string().contains("binary cleanup failed"));
    }

    #[test]
    fn test_run_summary() {
        let run = RunReport {
            devices: vec![DeviceReport {
                host: "r1".to_string(),
                connection_error: None,
                artifacts: vec![
                    stored(ArtifactKind::Binary, "b/r1.backup"),
                    stored(ArtifactKind::Plaintext, "p/r1.rsc"),
                ],
                close_error: None,
            }],
            retention: Some(SweepReport::default()),
        };
        assert_eq!(run.stored(), 2);
        assert!(!run.has_failures());
        let text = run.to_string();
        assert!(text.contains("binary backup downloaded: b/r1.backup"));
        assert!(text.contains("No old backups needed cleaning up"));
        assert!(text.ends_with("1 device(s), 2 artifact(s) stored, 0 device(s) with failures\n"));
    }
}
