//! Unit (0.2.0): rename the legacy `blueprints/` plan directory to
//! `plans/`, fixing any symlinks that still point through the old name.

use std::{
    fs,
    path::{Path, PathBuf},
};

use {tracing::debug, walkdir::WalkDir};

use crate::{
    error::Result,
    layout::{self, LEGACY_PLANS_DIR, PLANS_DIR},
    unit::{Applicability, ApplyOutcome, Change, MigrationUnit, TreeContext},
    version::LayoutVersion,
};

pub struct RenamePlansDir;

/// One planned filesystem operation. The whole change set is computed
/// read-only first, so dry-run and a real run report the identical list.
enum Op {
    RenameDir { from: PathBuf, to: PathBuf },
    MoveFile { from: PathBuf, to: PathBuf },
    /// Colliding legacy file: preserved beside the winner, never deleted.
    PreserveLegacy { from: PathBuf, to: PathBuf },
    RemovePollution { path: PathBuf },
    RemoveEmptyTree { path: PathBuf },
    Relink { link: PathBuf, target: PathBuf },
}

impl Op {
    fn change(&self) -> Option<Change> {
        match self {
            Self::RenameDir { from, to } | Self::MoveFile { from, to } => Some(Change::Renamed {
                from: from.clone(),
                to: to.clone(),
            }),
            Self::PreserveLegacy { from, to } => Some(Change::Renamed {
                from: from.clone(),
                to: to.clone(),
            }),
            Self::RemovePollution { path } | Self::RemoveEmptyTree { path } => {
                Some(Change::Removed { path: path.clone() })
            },
            Self::Relink { link, .. } => Some(Change::Rewritten { path: link.clone() }),
        }
    }
}

impl MigrationUnit for RenamePlansDir {
    fn id(&self) -> &'static str {
        "rename-plans-dir"
    }

    fn description(&self) -> &'static str {
        "rename the legacy blueprints/ directory to plans/"
    }

    fn target_version(&self) -> LayoutVersion {
        LayoutVersion::new(0, 2, 0)
    }

    fn can_apply(&self, tree: &TreeContext) -> Result<Applicability> {
        if layout::has_legacy_plans_dir(&tree.root) {
            Ok(Applicability::needed("legacy blueprints/ directory exists"))
        } else {
            Ok(Applicability::satisfied("no blueprints/ directory"))
        }
    }

    fn apply(&self, tree: &TreeContext, dry_run: bool) -> Result<ApplyOutcome> {
        let ops = plan_ops(&tree.root)?;
        let changes = ops.iter().filter_map(Op::change).collect();
        if !dry_run {
            execute(&ops)?;
        }
        Ok(ApplyOutcome { changes })
    }
}

fn plan_ops(root: &Path) -> Result<Vec<Op>> {
    let legacy = root.join(LEGACY_PLANS_DIR);
    let current = root.join(PLANS_DIR);
    let mut ops = Vec::new();

    if current.is_dir() {
        // Both names exist: merge legacy content in, current wins.
        let mut walker = WalkDir::new(&legacy).min_depth(1).into_iter();
        while let Some(entry) = walker.next() {
            let entry = entry.map_err(into_io)?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().is_dir() {
                // A pollution directory (`.rt-cache` and friends) is
                // removed whole; its contents never reach plans/.
                if layout::is_pollution(&name) {
                    ops.push(Op::RemovePollution {
                        path: entry.path().to_path_buf(),
                    });
                    walker.skip_current_dir();
                }
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&legacy)
                .unwrap_or(entry.path())
                .to_path_buf();
            let dest = current.join(&rel);
            if layout::is_pollution(&name) {
                ops.push(Op::RemovePollution {
                    path: entry.path().to_path_buf(),
                });
            } else if dest.exists() {
                // User plan content loses on name but is kept on disk.
                let mut preserved = dest.as_os_str().to_owned();
                preserved.push(".legacy");
                ops.push(Op::PreserveLegacy {
                    from: entry.path().to_path_buf(),
                    to: PathBuf::from(preserved),
                });
            } else {
                ops.push(Op::MoveFile {
                    from: entry.path().to_path_buf(),
                    to: dest,
                });
            }
        }
        ops.push(Op::RemoveEmptyTree {
            path: legacy.clone(),
        });
    } else {
        ops.push(Op::RenameDir {
            from: legacy.clone(),
            to: current.clone(),
        });
        // Pollution travels with the rename; sweep it at its new path.
        let mut walker = WalkDir::new(&legacy).min_depth(1).into_iter();
        while let Some(entry) = walker.next() {
            let entry = entry.map_err(into_io)?;
            let name = entry.file_name().to_string_lossy().to_string();
            if layout::is_pollution(&name) {
                ops.push(Op::RemovePollution {
                    path: rebase_under(entry.path(), &legacy, &current),
                });
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
            }
        }
    }

    // Symlinks anywhere in the tree whose target passes through the old
    // directory name get re-pointed. The link's own path is rebased too,
    // since it may live inside the directory being renamed.
    for entry in WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
    {
        let entry = entry.map_err(into_io)?;
        if !entry.path_is_symlink() {
            continue;
        }
        let target = fs::read_link(entry.path())?;
        if let Some(new_target) = rebase(&target, LEGACY_PLANS_DIR, PLANS_DIR) {
            let link = rebase_under(entry.path(), &legacy, &current);
            ops.push(Op::Relink {
                link,
                target: new_target,
            });
        }
    }

    Ok(ops)
}

fn execute(ops: &[Op]) -> Result<()> {
    for op in ops {
        match op {
            Op::RenameDir { from, to } => fs::rename(from, to)?,
            Op::MoveFile { from, to } => {
                if let Some(parent) = to.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::rename(from, to)?;
            },
            Op::PreserveLegacy { from, to } => fs::rename(from, to)?,
            Op::RemovePollution { path } => {
                if path.is_dir() {
                    fs::remove_dir_all(path)?;
                } else {
                    fs::remove_file(path)?;
                }
            },
            Op::RemoveEmptyTree { path } => {
                // Every file was moved out above; only directory skeleton
                // remains.
                fs::remove_dir_all(path)?;
            },
            Op::Relink { link, target } => {
                // A colliding legacy link may have been preserved under a
                // different name; nothing to re-point then.
                if link.symlink_metadata().is_err() {
                    continue;
                }
                debug!(link = %link.display(), target = %target.display(), "re-pointing symlink");
                fs::remove_file(link)?;
                #[cfg(unix)]
                std::os::unix::fs::symlink(target, link)?;
                #[cfg(not(unix))]
                return Err(std::io::Error::other("symlink fixup requires unix").into());
            },
        }
    }
    Ok(())
}

/// Replace the first path component equal to `old` with `new`, if any.
fn rebase(path: &Path, old: &str, new: &str) -> Option<PathBuf> {
    let mut replaced = false;
    let rebased: PathBuf = path
        .components()
        .map(|c| {
            if !replaced && c.as_os_str() == old {
                replaced = true;
                std::ffi::OsString::from(new)
            } else {
                c.as_os_str().to_owned()
            }
        })
        .collect();
    replaced.then_some(rebased)
}

/// If `path` lives under `legacy`, return its post-rename location.
fn rebase_under(path: &Path, legacy: &Path, current: &Path) -> PathBuf {
    match path.strip_prefix(legacy) {
        Ok(rel) => current.join(rel),
        Err(_) => path.to_path_buf(),
    }
}

fn into_io(e: walkdir::Error) -> crate::error::Error {
    std::io::Error::from(e).into()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_rename() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("blueprints/feature")).unwrap();
        fs::write(dir.path().join("blueprints/feature/plan.md"), "plan").unwrap();

        let tree = TreeContext::new(dir.path());
        let unit = RenamePlansDir;
        assert!(unit.can_apply(&tree).unwrap().applicable);

        let outcome = unit.apply(&tree, false).unwrap();
        assert_eq!(outcome.files_changed(), 1);
        assert!(!dir.path().join("blueprints").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("plans/feature/plan.md")).unwrap(),
            "plan"
        );
        // Idempotent: no longer applicable.
        assert!(!unit.can_apply(&tree).unwrap().applicable);
    }

    #[test]
    fn test_merge_current_wins_legacy_preserved() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("blueprints")).unwrap();
        fs::create_dir_all(dir.path().join("plans")).unwrap();
        fs::write(dir.path().join("blueprints/a.md"), "old a").unwrap();
        fs::write(dir.path().join("blueprints/b.md"), "old b").unwrap();
        fs::write(dir.path().join("blueprints/rt.lock"), "").unwrap();
        fs::write(dir.path().join("plans/a.md"), "new a").unwrap();

        let tree = TreeContext::new(dir.path());
        RenamePlansDir.apply(&tree, false).unwrap();

        assert!(!dir.path().join("blueprints").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("plans/a.md")).unwrap(),
            "new a"
        );
        // The losing legacy file is preserved, not deleted.
        assert_eq!(
            fs::read_to_string(dir.path().join("plans/a.md.legacy")).unwrap(),
            "old a"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("plans/b.md")).unwrap(),
            "old b"
        );
        // Pollution is gone.
        assert!(!dir.path().join("plans/rt.lock").exists());
    }

    #[test]
    fn test_merge_drops_pollution_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("blueprints/.rt-cache/objects")).unwrap();
        fs::write(dir.path().join("blueprints/.rt-cache/blob.bin"), "x").unwrap();
        fs::write(dir.path().join("blueprints/plan.md"), "p").unwrap();
        fs::create_dir_all(dir.path().join("plans")).unwrap();

        let tree = TreeContext::new(dir.path());
        RenamePlansDir.apply(&tree, false).unwrap();

        assert!(!dir.path().join("blueprints").exists());
        assert!(!dir.path().join("plans/.rt-cache").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("plans/plan.md")).unwrap(),
            "p"
        );
    }

    #[test]
    fn test_rename_drops_pollution_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("blueprints/.rt-cache")).unwrap();
        fs::write(dir.path().join("blueprints/.rt-cache/blob.bin"), "x").unwrap();
        fs::write(dir.path().join("blueprints/.DS_Store"), "").unwrap();
        fs::write(dir.path().join("blueprints/plan.md"), "p").unwrap();

        let tree = TreeContext::new(dir.path());
        RenamePlansDir.apply(&tree, false).unwrap();

        assert!(!dir.path().join("plans/.rt-cache").exists());
        assert!(!dir.path().join("plans/.DS_Store").exists());
        assert!(dir.path().join("plans/plan.md").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_repointed() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("blueprints")).unwrap();
        fs::write(dir.path().join("blueprints/plan.md"), "p").unwrap();
        std::os::unix::fs::symlink("blueprints/plan.md", dir.path().join("active.md")).unwrap();

        let tree = TreeContext::new(dir.path());
        RenamePlansDir.apply(&tree, false).unwrap();

        let target = fs::read_link(dir.path().join("active.md")).unwrap();
        assert_eq!(target, PathBuf::from("plans/plan.md"));
        assert_eq!(
            fs::read_to_string(dir.path().join("active.md")).unwrap(),
            "p"
        );
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("blueprints")).unwrap();
        fs::write(dir.path().join("blueprints/plan.md"), "p").unwrap();

        let tree = TreeContext::new(dir.path());
        let outcome = RenamePlansDir.apply(&tree, true).unwrap();
        assert_eq!(outcome.files_changed(), 1);
        assert!(dir.path().join("blueprints/plan.md").exists());
        assert!(!dir.path().join("plans").exists());
    }
}
