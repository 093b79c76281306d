//! Worktree discovery and the fan-out upgrade coordinator.
//!
//! Linked worktrees are discovered through git's own worktree registry
//! (`git worktree list --porcelain`), never by directory scanning. Each
//! worktree is upgraded by a fresh, independent runner against its own
//! metadata file; one worktree's failure never aborts its siblings, and
//! "primary succeeded, some worktrees failed" is a legitimate terminal
//! state with its own exit code.

// NOTE: worktree porcelain operations shell out to `git`; in-process
// gitoxide APIs are not yet practical for this code path.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    serde::Serialize,
    tokio::process::Command,
    tracing::{debug, info, warn},
};

use crate::{
    bundle::{BundleLocator, DistBundle},
    detect::{Detection, detect},
    error::{Error, Result},
    metadata::MetadataStore,
    registry::Registry,
    runner::{Runner, TreeReport, UpgradeOptions},
    unit::TreeContext,
};

/// A linked worktree discovered for one run. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct WorktreeDescriptor {
    pub path: PathBuf,
    pub branch: Option<String>,
}

/// List linked worktrees of a primary tree, excluding the primary itself
/// (always the first porcelain entry).
pub async fn list_worktrees(primary_root: &Path) -> Result<Vec<WorktreeDescriptor>> {
    let output = Command::new("git")
        .args(["worktree", "list", "--porcelain"])
        .current_dir(primary_root)
        .output()
        .await
        .map_err(|e| Error::command_execution("git worktree list", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::command_failed("git worktree list", stderr));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut worktrees = Vec::new();
    let mut current_path: Option<PathBuf> = None;
    let mut current_branch: Option<String> = None;
    let mut seen_primary = false;

    let mut flush =
        |path: Option<PathBuf>, branch: Option<String>, seen_primary: &mut bool| {
            if let Some(path) = path {
                if *seen_primary {
                    worktrees.push(WorktreeDescriptor { path, branch });
                } else {
                    *seen_primary = true;
                }
            }
        };

    for line in stdout.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            current_path = Some(PathBuf::from(path));
        } else if let Some(branch) = line.strip_prefix("branch refs/heads/") {
            current_branch = Some(branch.to_string());
        } else if line.is_empty() {
            flush(current_path.take(), current_branch.take(), &mut seen_primary);
        }
    }
    // Last entry has no trailing blank line.
    flush(current_path, current_branch, &mut seen_primary);

    Ok(worktrees)
}

/// Resolve the hooks directory for a tree through git. Worktrees share
/// the primary's hooks directory, so the guard unit sees an installed
/// hook as already-satisfied there.
pub async fn hooks_dir(root: &Path) -> Result<PathBuf> {
    let output = Command::new("git")
        .args(["rev-parse", "--git-path", "hooks"])
        .current_dir(root)
        .output()
        .await
        .map_err(|e| Error::command_execution("git rev-parse --git-path hooks", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::command_failed("git rev-parse --git-path hooks", stderr));
    }

    let path = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
    Ok(if path.is_absolute() {
        path
    } else {
        root.join(path)
    })
}

/// Aggregate terminal state of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeStatus {
    Success,
    PrimaryFailed,
    /// Primary succeeded, at least one worktree failed. Partial success
    /// is a distinct, legitimate terminal state, not a defect.
    WorktreeFailures,
}

impl UpgradeStatus {
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::PrimaryFailed => 1,
            Self::WorktreeFailures => 2,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UpgradeReport {
    pub primary: TreeReport,
    pub worktrees: Vec<TreeReport>,
}

impl UpgradeReport {
    #[must_use]
    pub fn status(&self) -> UpgradeStatus {
        if !self.primary.succeeded() {
            UpgradeStatus::PrimaryFailed
        } else if self.worktrees.iter().any(|w| !w.succeeded()) {
            UpgradeStatus::WorktreeFailures
        } else {
            UpgradeStatus::Success
        }
    }
}

/// Read-only status of one tree, for `ratchet status`.
#[derive(Debug, Serialize)]
pub struct TreeStatus {
    pub root: PathBuf,
    pub detection: Detection,
    pub metadata_present: bool,
    pub pending: Vec<String>,
}

/// Runs the primary tree's upgrade, then fans out across every linked
/// worktree sequentially, collecting per-tree results.
pub struct Coordinator {
    registry: Registry,
    bundle: Arc<dyn BundleLocator>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Registry::builtin(),
            bundle: Arc::new(DistBundle),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_bundle(mut self, bundle: Arc<dyn BundleLocator>) -> Self {
        self.bundle = bundle;
        self
    }

    /// Upgrade the primary tree and, unless disabled, every linked
    /// worktree. Precondition errors on the primary are fatal; everything
    /// downstream is collected into the report.
    pub async fn upgrade(&self, primary_root: &Path, opts: &UpgradeOptions) -> Result<UpgradeReport> {
        self.check_primary(primary_root)?;

        let primary = Runner::new(&self.registry, self.context(primary_root).await)
            .upgrade(opts)?;

        let mut worktrees = Vec::new();
        if opts.include_worktrees && primary.succeeded() {
            for wt in list_worktrees(primary_root).await? {
                info!(worktree = %wt.path.display(), "upgrading worktree");
                worktrees.push(self.run_worktree(&wt, opts).await);
            }
        }

        Ok(UpgradeReport { primary, worktrees })
    }

    /// Read-only status for the primary and every linked worktree.
    pub async fn status(&self, primary_root: &Path, include_worktrees: bool) -> Result<Vec<TreeStatus>> {
        self.check_primary(primary_root)?;
        let mut out = vec![self.tree_status(primary_root).await];
        if include_worktrees {
            for wt in list_worktrees(primary_root).await? {
                out.push(self.tree_status(&wt.path).await);
            }
        }
        Ok(out)
    }

    async fn tree_status(&self, root: &Path) -> TreeStatus {
        let tree = self.context(root).await;
        let metadata = MetadataStore::for_root(root).load();
        let detection = detect(&tree, metadata.as_ref());
        let pending = match detection.version() {
            Some(from) => self
                .registry
                .applicable(from, crate::version::CURRENT_VERSION)
                .into_iter()
                .filter(|u| !metadata.as_ref().is_some_and(|m| m.has_migration(u.id())))
                .map(|u| u.id().to_string())
                .collect(),
            None => Vec::new(),
        };
        TreeStatus {
            root: root.to_path_buf(),
            detection,
            metadata_present: metadata.is_some(),
            pending,
        }
    }

    /// A worktree's failure is isolated into its report, never escalated.
    async fn run_worktree(&self, wt: &WorktreeDescriptor, opts: &UpgradeOptions) -> TreeReport {
        let tree = self.context(&wt.path).await;
        match Runner::new(&self.registry, tree).upgrade(opts) {
            Ok(report) => report,
            Err(e) => {
                warn!(worktree = %wt.path.display(), error = %e, "worktree upgrade failed");
                TreeReport::failed(wt.path.clone(), e.to_string())
            },
        }
    }

    async fn context(&self, root: &Path) -> TreeContext {
        let mut tree = TreeContext::new(root).with_bundle(Arc::clone(&self.bundle));
        match hooks_dir(root).await {
            Ok(dir) => tree = tree.with_hooks_dir(dir),
            Err(e) => {
                // Fall back to the conventional location; detection and
                // the guard unit degrade gracefully.
                debug!(root = %root.display(), error = %e, "hooks dir resolution failed");
            },
        }
        tree
    }

    fn check_primary(&self, root: &Path) -> Result<()> {
        let dot_git = root.join(".git");
        if !dot_git.exists() {
            return Err(Error::NotGitRepository {
                path: root.to_path_buf(),
            });
        }
        // A linked worktree's `.git` is a file pointing at the primary.
        if dot_git.is_file() {
            return Err(Error::NotPrimaryTree {
                path: root.to_path_buf(),
            });
        }
        Ok(())
    }
}
