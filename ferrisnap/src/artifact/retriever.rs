//! Artifact retrieval: copy to local storage, then remove the device's copy.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tokio::fs::{self, OpenOptions};

use super::ArtifactName;
use super::producer::ProducedArtifact;
use crate::error::ArtifactError;
use crate::platform::Dialect;
use crate::transport::RemoteSession;

/// Outcome of one retrieval.
#[derive(Debug)]
pub struct Retrieval {
    /// Local path of the downloaded artifact, or why there is none.
    pub local: Result<PathBuf, ArtifactError>,

    /// Outcome of removing the transient remote copy. Never escalated.
    pub cleanup: Result<(), ArtifactError>,
}

/// Pulls produced artifacts off a device.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactRetriever<'a> {
    dialect: &'a Dialect,
}

impl<'a> ArtifactRetriever<'a> {
    /// Create a retriever that removes remote files with `dialect`'s command.
    pub fn new(dialect: &'a Dialect) -> Self {
        Self { dialect }
    }

    /// Download `artifact` into `local_dir`, then remove it from the device.
    ///
    /// The remote remove command is issued exactly once, whatever happened
    /// to the download. Local files are never overwritten, and a partially
    /// written file is removed when the transfer fails.
    pub async fn retrieve<S: RemoteSession>(
        &self,
        session: &mut S,
        artifact: &ProducedArtifact,
        local_dir: &Path,
    ) -> Retrieval {
        let local = self.fetch(session, artifact, local_dir).await;
        match &local {
            Ok(path) => info!("{} backup downloaded: {}", artifact.name.kind(), path.display()),
            Err(e) => warn!("{}", e),
        }

        let cleanup = self.remove(session, &artifact.name).await;

        Retrieval { local, cleanup }
    }

    async fn fetch<S: RemoteSession>(
        &self,
        session: &mut S,
        artifact: &ProducedArtifact,
        local_dir: &Path,
    ) -> Result<PathBuf, ArtifactError> {
        let file = artifact.file_name();
        let failed = |reason: String| ArtifactError::TransferFailed {
            file: file.clone(),
            reason,
        };

        if !artifact.is_ready() {
            return Err(failed(format!(
                "artifact did not appear on the device ({:?})",
                artifact.readiness
            )));
        }

        let local_path = local_dir.join(&file);
        let mut sink = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&local_path)
            .await
            .map_err(|e| failed(format!("cannot create {}: {}", local_path.display(), e)))?;

        match session.download(&file, &mut sink).await {
            Ok(bytes) => {
                debug!("Copied {} bytes into {}", bytes, local_path.display());
                Ok(local_path)
            }
            Err(e) => {
                drop(sink);
                if let Err(remove_err) = fs::remove_file(&local_path).await {
                    debug!(
                        "Could not remove partial file {}: {}",
                        local_path.display(),
                        remove_err
                    );
                }
                Err(failed(e.to_string()))
            }
        }
    }

    /// Issue the dialect's remove command for `name` once.
    ///
    /// Failures are logged and returned, never retried.
    pub async fn remove<S: RemoteSession>(
        &self,
        session: &mut S,
        name: &ArtifactName,
    ) -> Result<(), ArtifactError> {
        let result = self.remove_remote(session, name).await;
        if let Err(e) = &result {
            warn!("{}", e);
        }
        result
    }

    async fn remove_remote<S: RemoteSession>(
        &self,
        session: &mut S,
        name: &ArtifactName,
    ) -> Result<(), ArtifactError> {
        let file = name.file_name();
        let command = self.dialect.remove_command(name.base(), &file);

        let output = session
            .execute(&command)
            .await
            .map_err(|e| ArtifactError::RemoteCleanupFailed {
                file: file.clone(),
                reason: e.to_string(),
            })?;

        match output.failure(&self.dialect.failed_when_contains) {
            Some(reason) => Err(ArtifactError::RemoteCleanupFailed { file, reason }),
            None => {
                debug!("Removed remote {}", file);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::artifact::{ArtifactKind, ArtifactName, Readiness};
    use crate::platform::vendors::routeros;
    use crate::testing::{Call, FakeDevice, FakeSession, fixed_time};

    const FILE: &str = "host1_backup_20240101_120000.backup";

    fn produced(readiness: Readiness) -> ProducedArtifact {
        let name = ArtifactName::new("host1", ArtifactKind::Binary, &fixed_time());
        ProducedArtifact {
            command: format!("/system backup save name={}", name.base()),
            name,
            readiness,
        }
    }

    /// Session where the binary artifact already exists on the device.
    async fn session_with_artifact(device: FakeDevice) -> FakeSession {
        let mut session = FakeSession::new("host1", device);
        session
            .execute("/system backup save name=host1_backup_20240101_120000")
            .await
            .unwrap();
        session
    }

    fn removes(session: &FakeSession) -> usize {
        session
            .journal()
            .iter()
            .filter(|call| matches!(call, Call::Exec(_, cmd) if cmd == &format!("/file remove {FILE}")))
            .count()
    }

    #[tokio::test]
    async fn test_retrieve_downloads_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let dialect = routeros::dialect();
        let mut session = session_with_artifact(FakeDevice::default()).await;

        let retrieval = ArtifactRetriever::new(&dialect)
            .retrieve(&mut session, &produced(Readiness::Assumed), dir.path())
            .await;

        let path = retrieval.local.unwrap();
        assert_eq!(path, dir.path().join(FILE));
        assert_eq!(std::fs::read(&path).unwrap(), b"artifact-bytes");
        assert!(retrieval.cleanup.is_ok());
        assert_eq!(removes(&session), 1);
        assert!(session.remote_files().is_empty());
    }

    #[tokio::test]
    async fn test_failed_transfer_still_removes_remote_once() {
        let dir = tempfile::tempdir().unwrap();
        let dialect = routeros::dialect();
        let mut session = session_with_artifact(FakeDevice::default().with_broken_downloads()).await;

        let retrieval = ArtifactRetriever::new(&dialect)
            .retrieve(&mut session, &produced(Readiness::Assumed), dir.path())
            .await;

        assert!(matches!(
            retrieval.local,
            Err(ArtifactError::TransferFailed { .. })
        ));
        assert!(retrieval.cleanup.is_ok());
        assert_eq!(removes(&session), 1);
        // Partial download is not left behind
        assert!(!dir.path().join(FILE).exists());
    }

    #[tokio::test]
    async fn test_timed_out_artifact_skips_download_but_removes() {
        let dir = tempfile::tempdir().unwrap();
        let dialect = routeros::dialect();
        let mut session = FakeSession::new("host1", FakeDevice::default());

        let retrieval = ArtifactRetriever::new(&dialect)
            .retrieve(
                &mut session,
                &produced(Readiness::TimedOut(Duration::from_secs(30))),
                dir.path(),
            )
            .await;

        assert!(matches!(
            retrieval.local,
            Err(ArtifactError::TransferFailed { .. })
        ));
        assert!(
            !session
                .journal()
                .iter()
                .any(|call| matches!(call, Call::Download(..)))
        );
        assert_eq!(removes(&session), 1);
    }

    #[tokio::test]
    async fn test_existing_local_file_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FILE), b"older").unwrap();
        let dialect = routeros::dialect();
        let mut session = session_with_artifact(FakeDevice::default()).await;

        let retrieval = ArtifactRetriever::new(&dialect)
            .retrieve(&mut session, &produced(Readiness::Assumed), dir.path())
            .await;

        assert!(matches!(
            retrieval.local,
            Err(ArtifactError::TransferFailed { .. })
        ));
        assert_eq!(std::fs::read(dir.path().join(FILE)).unwrap(), b"older");
        assert_eq!(removes(&session), 1);
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_reported_not_escalated() {
        let dir = tempfile::tempdir().unwrap();
        let dialect = routeros::dialect();
        let device = FakeDevice::default().with_stderr("/file remove", "no such item");
        let mut session = session_with_artifact(device).await;

        let retrieval = ArtifactRetriever::new(&dialect)
            .retrieve(&mut session, &produced(Readiness::Assumed), dir.path())
            .await;

        assert!(retrieval.local.is_ok());
        assert!(matches!(
            retrieval.cleanup,
            Err(ArtifactError::RemoteCleanupFailed { .. })
        ));
        assert_eq!(removes(&session), 1);
    }
}
