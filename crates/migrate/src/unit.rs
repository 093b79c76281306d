//! The migration-unit contract.

use std::{fmt, path::PathBuf, sync::Arc};

use serde::Serialize;

use crate::{
    bundle::{BundleLocator, DistBundle},
    error::Result,
    version::LayoutVersion,
};

/// Everything a unit may see of the tree it operates on.
///
/// One context per tree per run. `hooks_dir` is resolved by the
/// coordinator through git (worktrees share a hooks directory with their
/// primary); the default is the plain `.git/hooks` of a standalone tree.
#[derive(Clone)]
pub struct TreeContext {
    pub root: PathBuf,
    pub hooks_dir: PathBuf,
    pub bundle: Arc<dyn BundleLocator>,
}

impl TreeContext {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let hooks_dir = root.join(".git").join("hooks");
        Self {
            root,
            hooks_dir,
            bundle: Arc::new(DistBundle),
        }
    }

    #[must_use]
    pub fn with_hooks_dir(mut self, hooks_dir: impl Into<PathBuf>) -> Self {
        self.hooks_dir = hooks_dir.into();
        self
    }

    #[must_use]
    pub fn with_bundle(mut self, bundle: Arc<dyn BundleLocator>) -> Self {
        self.bundle = bundle;
        self
    }
}

/// Result of a unit's applicability check, with the reason either way.
#[derive(Debug, Clone, Serialize)]
pub struct Applicability {
    pub applicable: bool,
    pub reason: String,
}

impl Applicability {
    #[must_use]
    pub fn needed(reason: impl Into<String>) -> Self {
        Self {
            applicable: true,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn satisfied(reason: impl Into<String>) -> Self {
        Self {
            applicable: false,
            reason: reason.into(),
        }
    }
}

/// One concrete filesystem change a unit performed (or, in dry-run mode,
/// would perform).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    Created { path: PathBuf },
    Renamed { from: PathBuf, to: PathBuf },
    Appended { path: PathBuf },
    Rewritten { path: PathBuf },
    Removed { path: PathBuf },
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { path } => write!(f, "create {}", path.display()),
            Self::Renamed { from, to } => {
                write!(f, "rename {} -> {}", from.display(), to.display())
            },
            Self::Appended { path } => write!(f, "append {}", path.display()),
            Self::Rewritten { path } => write!(f, "rewrite {}", path.display()),
            Self::Removed { path } => write!(f, "remove {}", path.display()),
        }
    }
}

/// What a unit's `apply` did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyOutcome {
    pub changes: Vec<Change>,
}

impl ApplyOutcome {
    #[must_use]
    pub fn files_changed(&self) -> usize {
        self.changes.len()
    }

    /// One-line summary for migration-record detail fields.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.changes.is_empty() {
            "no changes".into()
        } else {
            self.changes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        }
    }
}

/// One self-contained, idempotent layout transformation.
///
/// Units never mutate anything in `can_apply`, never delete content a user
/// could have customized (the pollution allow-list excepted), and compute
/// the full change set without writing when `dry_run` is set. Propagation
/// across worktrees is the coordinator's job; a unit only ever sees the
/// single tree in its context.
pub trait MigrationUnit: Send + Sync {
    fn id(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn target_version(&self) -> LayoutVersion;
    fn can_apply(&self, tree: &TreeContext) -> Result<Applicability>;
    fn apply(&self, tree: &TreeContext, dry_run: bool) -> Result<ApplyOutcome>;
}
