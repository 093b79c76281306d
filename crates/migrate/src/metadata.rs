//! Per-tree layout metadata with atomic persistence.
//!
//! Every tree (primary or linked worktree) owns one `meta.json` in its
//! control directory: layout version, creation timestamp, platform, and
//! the permanent audit trail of applied migrations.

use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use {
    serde::{Deserialize, Serialize},
    tracing::warn,
};

use crate::{
    error::{Error, Result},
    layout,
    version::LayoutVersion,
};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationResult {
    Success,
    Failure,
}

/// One applied-migration entry. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: String,
    pub result: MigrationResult,
    pub applied_at_ms: u64,
    pub detail: String,
}

/// The per-tree metadata document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub schema: u32,
    pub version: LayoutVersion,
    pub created_at_ms: u64,
    pub platform: String,
    #[serde(default)]
    pub migrations: Vec<MigrationRecord>,
}

impl ProjectMetadata {
    /// Fresh metadata for a tree first touched at `version`.
    #[must_use]
    pub fn new(version: LayoutVersion) -> Self {
        Self {
            schema: 1,
            version,
            created_at_ms: now_ms(),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            migrations: Vec::new(),
        }
    }

    /// Whether `id` has a successful record. Failed attempts do not count:
    /// a re-run after the cause is fixed must retry the unit.
    #[must_use]
    pub fn has_migration(&self, id: &str) -> bool {
        self.migrations
            .iter()
            .any(|r| r.id == id && r.result == MigrationResult::Success)
    }

    /// Append a record. History is append-only; a second success for the
    /// same id is a logic error.
    pub fn record_migration(
        &mut self,
        id: &str,
        result: MigrationResult,
        detail: impl Into<String>,
    ) -> Result<()> {
        if result == MigrationResult::Success && self.has_migration(id) {
            return Err(Error::DuplicateRecord { id: id.into() });
        }
        self.migrations.push(MigrationRecord {
            id: id.into(),
            result,
            applied_at_ms: now_ms(),
            detail: detail.into(),
        });
        Ok(())
    }
}

/// Loads and saves `meta.json` for one tree.
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    #[must_use]
    pub fn for_root(root: &Path) -> Self {
        Self {
            path: layout::metadata_path(root),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load metadata from disk.
    ///
    /// Never fails the caller: a missing file and a malformed file both
    /// resolve to `None` (with the reason logged), so detection uniformly
    /// falls back to heuristics.
    #[must_use]
    pub fn load(&self) -> Option<ProjectMetadata> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "metadata unreadable, falling back to heuristics");
                return None;
            },
        };
        match serde_json::from_str(&data) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "metadata malformed, falling back to heuristics");
                None
            },
        }
    }

    /// Save atomically via temp file + rename. A reader racing this write
    /// sees either the old or the new document, never a torn file.
    pub fn save(&self, metadata: &ProjectMetadata) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(metadata)?;
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
