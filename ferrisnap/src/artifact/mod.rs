//! Backup artifacts: what the device produces and how it is named.
//!
//! An artifact cycle is produce (trigger plus settle) followed by retrieve
//! (download plus remote removal). Both halves report typed
//! [`ArtifactError`](crate::error::ArtifactError)s instead of raising them
//! past the cycle.

mod producer;
mod retriever;

pub use producer::{ArtifactProducer, ProducedArtifact, Readiness, SettlePolicy};
pub use retriever::{ArtifactRetriever, Retrieval};

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

/// Timestamp format used in artifact names (second resolution).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// The two artifact categories produced for every device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Binary snapshot (`.backup`).
    Binary,
    /// Plaintext configuration export (`.rsc`).
    Plaintext,
}

impl ArtifactKind {
    /// Both kinds, in the order they are produced.
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Binary, ArtifactKind::Plaintext];

    /// Tag placed between host and timestamp in the artifact name.
    pub fn tag(self) -> &'static str {
        match self {
            ArtifactKind::Binary => "backup",
            ArtifactKind::Plaintext => "config",
        }
    }

    /// File suffix, including the dot.
    pub fn suffix(self) -> &'static str {
        match self {
            ArtifactKind::Binary => ".backup",
            ArtifactKind::Plaintext => ".rsc",
        }
    }

    /// Name of the local category directory.
    pub fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::Binary => "binary",
            ArtifactKind::Plaintext => "plaintext",
        }
    }

    /// Check whether `path` carries this kind's suffix.
    pub fn matches(self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.len() > self.suffix().len() && name.ends_with(self.suffix()))
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Binary => write!(f, "binary"),
            ArtifactKind::Plaintext => write!(f, "plaintext"),
        }
    }
}

/// One artifact category bound to its local directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    /// Artifact category.
    pub kind: ArtifactKind,

    /// Directory downloaded artifacts of this kind are stored in.
    pub local_dir: PathBuf,
}

impl ArtifactSpec {
    /// Create a spec for `kind` stored under `local_dir`.
    pub fn new(kind: ArtifactKind, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            local_dir: local_dir.into(),
        }
    }
}

/// Host as it appears in artifact file names.
///
/// Characters that are unsafe in a file name (path separators, IPv6 colons,
/// whitespace) are replaced with `_`.
pub fn sanitize_host(host: &str) -> String {
    host.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Name of one artifact: `<host>_<tag>_<YYYYMMDD_HHMMSS>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactName {
    base: String,
    kind: ArtifactKind,
}

impl ArtifactName {
    /// Build the name for `host`'s artifact of `kind` created at `at`.
    ///
    /// The host goes through [`sanitize_host`].
    pub fn new<Tz>(host: &str, kind: ArtifactKind, at: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let base = format!(
            "{}_{}_{}",
            sanitize_host(host),
            kind.tag(),
            at.format(TIMESTAMP_FORMAT)
        );
        Self { base, kind }
    }

    /// Base name without suffix, as passed to the trigger command.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// File name on the device and in local storage.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.base, self.kind.suffix())
    }

    /// Artifact category.
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}
