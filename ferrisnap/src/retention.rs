//! Retention sweep over local backup storage.
//!
//! Each category directory is swept on its own: only regular files that sit
//! directly in the directory and carry the category suffix are candidates.
//! Nothing outside the storage layout is ever touched.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};

use crate::artifact::ArtifactKind;
use crate::error::RetentionError;
use crate::storage::StorageLayout;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Maximum age of stored backups, applied to both categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Files whose age in whole days exceeds this are deleted.
    pub max_age_days: u64,
}

impl RetentionPolicy {
    /// Default retention, in days.
    pub const DEFAULT_MAX_AGE_DAYS: u64 = 30;

    /// Policy keeping files up to `max_age_days` whole days old.
    pub fn new(max_age_days: u64) -> Self {
        Self { max_age_days }
    }

    /// Whether a file of the given age is due for deletion.
    pub fn is_expired(&self, age: Duration) -> bool {
        age.as_secs() / SECS_PER_DAY > self.max_age_days
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_AGE_DAYS)
    }
}

/// What a sweep did.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Files that were deleted.
    pub deleted: Vec<PathBuf>,

    /// Per-file (or per-directory) errors; the sweep carried on past each.
    pub failures: Vec<RetentionError>,
}

impl SweepReport {
    /// Whether any deletion or listing failed.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.deleted.is_empty() {
            writeln!(f, "No old backups needed cleaning up")?;
        } else {
            writeln!(f, "Cleaned up old backups:")?;
            for path in &self.deleted {
                writeln!(f, "- Removed: {}", path.display())?;
            }
        }
        for failure in &self.failures {
            writeln!(f, "- {}", failure)?;
        }
        Ok(())
    }
}

/// Sweep `layout` using the current time.
pub fn sweep(layout: &StorageLayout, policy: RetentionPolicy) -> SweepReport {
    sweep_at(layout, policy, SystemTime::now())
}

/// Sweep `layout` as if the current time were `now`.
pub fn sweep_at(layout: &StorageLayout, policy: RetentionPolicy, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();

    for kind in ArtifactKind::ALL {
        sweep_category(&layout.dir_for(kind), kind, policy, now, &mut report);
    }

    if report.deleted.is_empty() {
        info!("No old backups needed cleaning up");
    } else {
        info!("Removed {} old backup(s)", report.deleted.len());
    }
    report
}

fn sweep_category(
    dir: &Path,
    kind: ArtifactKind,
    policy: RetentionPolicy,
    now: SystemTime,
    report: &mut SweepReport,
) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} does not exist, nothing to sweep", dir.display());
            return;
        }
        Err(source) => {
            report.failures.push(RetentionError::ReadDir {
                path: dir.to_path_buf(),
                source,
            });
            return;
        }
    };

    let mut candidates = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if kind.matches(&path) {
                    candidates.push(path);
                }
            }
            Err(source) => report.failures.push(RetentionError::ReadDir {
                path: dir.to_path_buf(),
                source,
            }),
        }
    }
    candidates.sort();

    for path in candidates {
        match age_of(&path, now) {
            Ok(Some(age)) if policy.is_expired(age) => match fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Removed {} ({} days old)", path.display(), age.as_secs() / SECS_PER_DAY);
                    report.deleted.push(path);
                }
                Err(source) => {
                    let error = RetentionError::Delete { path, source };
                    warn!("{}", error);
                    report.failures.push(error);
                }
            },
            Ok(_) => {}
            Err(source) => {
                let error = RetentionError::Metadata { path, source };
                warn!("{}", error);
                report.failures.push(error);
            }
        }
    }
}

/// Age of a regular file, or `None` for anything else (symlinks,
/// directories). Files modified in the future are zero days old.
fn age_of(path: &Path, now: SystemTime) -> io::Result<Option<Duration>> {
    let metadata = fs::symlink_metadata(path)?;
    if !metadata.file_type().is_file() {
        return Ok(None);
    }
    let modified = metadata.modified()?;
    Ok(Some(now.duration_since(modified).unwrap_or(Duration::ZERO)))
}
