//! Unit (0.4.0): rename the command-template subdirectory from `rt/` to
//! `ratchet/` inside every agent grouping folder.
//!
//! When both names coexist, current-name files win conflicts and the
//! legacy directory is removed after the merge — its content is derived,
//! machine-generated command files, re-creatable from the bundle. Merged
//! files with a bundled template counterpart are re-rendered so stale
//! copies discovered under the old name cannot linger.

use std::{
    fs,
    path::{Path, PathBuf},
};

use {tracing::warn, walkdir::WalkDir};

use crate::{
    bundle::Bundle,
    error::Result,
    layout::{self, COMMAND_SUBDIR, LEGACY_COMMAND_SUBDIR},
    unit::{Applicability, ApplyOutcome, Change, MigrationUnit, TreeContext},
    version::LayoutVersion,
};

pub struct RenameCommandDirs;

enum Op {
    RenameDir { from: PathBuf, to: PathBuf },
    MoveFile { from: PathBuf, to: PathBuf },
    RemoveFile { path: PathBuf },
    RemoveTree { path: PathBuf },
    Render { path: PathBuf, content: Vec<u8> },
}

impl Op {
    fn change(&self) -> Change {
        match self {
            Self::RenameDir { from, to } | Self::MoveFile { from, to } => Change::Renamed {
                from: from.clone(),
                to: to.clone(),
            },
            Self::RemoveFile { path } | Self::RemoveTree { path } => {
                Change::Removed { path: path.clone() }
            },
            Self::Render { path, .. } => Change::Rewritten { path: path.clone() },
        }
    }
}

impl MigrationUnit for RenameCommandDirs {
    fn id(&self) -> &'static str {
        "rename-command-dirs"
    }

    fn description(&self) -> &'static str {
        "rename rt/ command subdirectories to ratchet/ and re-render commands"
    }

    fn target_version(&self) -> LayoutVersion {
        LayoutVersion::new(0, 4, 0)
    }

    fn can_apply(&self, tree: &TreeContext) -> Result<Applicability> {
        let groups = layout::group_dirs_with_legacy_commands(&tree.root);
        if groups.is_empty() {
            Ok(Applicability::satisfied("no legacy rt/ command subdirectory"))
        } else {
            Ok(Applicability::needed(format!(
                "legacy rt/ subdirectory in {} grouping folder(s)",
                groups.len()
            )))
        }
    }

    fn apply(&self, tree: &TreeContext, dry_run: bool) -> Result<ApplyOutcome> {
        let bundle = tree.bundle.locate();
        if bundle.is_none() {
            // Rename still proceeds; only the refresh step needs the
            // bundle. Completeness is the templates unit's concern.
            warn!("bundle unavailable, merged command files will not be re-rendered");
        }

        let mut ops = Vec::new();
        for group in layout::group_dirs_with_legacy_commands(&tree.root) {
            plan_group(&group, bundle.as_ref(), &mut ops)?;
        }

        let changes = ops.iter().map(Op::change).collect();
        if !dry_run {
            execute(&ops)?;
        }
        Ok(ApplyOutcome { changes })
    }
}

fn plan_group(group: &Path, bundle: Option<&Bundle>, ops: &mut Vec<Op>) -> Result<()> {
    let legacy = group.join(LEGACY_COMMAND_SUBDIR);
    let current = group.join(COMMAND_SUBDIR);

    // Filenames that will exist under the current name after the merge,
    // paired with the bytes they will hold, for the re-render pass.
    let mut merged: Vec<(PathBuf, Vec<u8>)> = Vec::new();

    if current.is_dir() {
        for entry in WalkDir::new(&legacy).min_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_dir() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&legacy)
                .unwrap_or(entry.path())
                .to_path_buf();
            let dest = current.join(&rel);
            if dest.exists() {
                // Current wins; the legacy copy is a stale derived file.
                ops.push(Op::RemoveFile {
                    path: entry.path().to_path_buf(),
                });
            } else {
                merged.push((dest.clone(), fs::read(entry.path())?));
                ops.push(Op::MoveFile {
                    from: entry.path().to_path_buf(),
                    to: dest,
                });
            }
        }
        ops.push(Op::RemoveTree {
            path: legacy.clone(),
        });
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                merged.push((entry.path(), fs::read(entry.path())?));
            }
        }
    } else {
        for entry in WalkDir::new(&legacy).min_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_dir() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&legacy)
                .unwrap_or(entry.path())
                .to_path_buf();
            merged.push((current.join(rel), fs::read(entry.path())?));
        }
        ops.push(Op::RenameDir {
            from: legacy.clone(),
            to: current.clone(),
        });
    }

    if let Some(bundle) = bundle {
        for (path, on_disk) in merged {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            if let Some(template) = bundle.read(&format!("templates/commands/{name}"))
                && template != on_disk
            {
                ops.push(Op::Render {
                    path,
                    content: template,
                });
            }
        }
    }

    Ok(())
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
            Op::RemoveFile { path } => fs::remove_file(path)?,
            Op::RemoveTree { path } => fs::remove_dir_all(path)?,
            Op::Render { path, content } => fs::write(path, content)?,
        }
    }
    Ok(())
}
