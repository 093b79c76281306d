//! Layout constants and shared structural predicates.
//!
//! Both the version detector and the migration units judge a tree through
//! these predicates, so a unit's `can_apply` and the heuristic that maps
//! the same structure to a version can never disagree.

use std::{
    fs,
    path::{Path, PathBuf},
};

/// Control directory at the project root.
pub const CONTROL_DIR: &str = ".ratchet";

/// Metadata file name inside [`CONTROL_DIR`].
pub const META_FILE: &str = "meta.json";

/// Current top-level plan directory name.
pub const PLANS_DIR: &str = "plans";

/// Pre-0.2.0 name of the plan directory.
pub const LEGACY_PLANS_DIR: &str = "blueprints";

/// Current command-template subdirectory name inside each grouping folder.
pub const COMMAND_SUBDIR: &str = "ratchet";

/// Pre-0.4.0 name of the command-template subdirectory.
pub const LEGACY_COMMAND_SUBDIR: &str = "rt";

/// Agent command grouping folders, relative to the project root.
pub const COMMAND_GROUP_DIRS: &[&str] = &[".claude/commands", ".gemini/commands", ".opencode/command"];

/// Entries every managed project's `.gitignore` must carry.
pub const REQUIRED_IGNORE_ENTRIES: &[&str] =
    &[".ratchet/cache/", ".ratchet/tmp/", "plans/*/scratch/"];

/// Marker line identifying our pre-commit guard inside a hook script.
pub const GUARD_MARKER: &str = "# ratchet pre-commit guard";

/// The guard script installed as (or appended to) `pre-commit`.
pub const GUARD_SCRIPT: &str = "\
#!/bin/sh
# ratchet pre-commit guard
# Blocks commits that stage ratchet cache or plan scratch content.
staged=$(git diff --cached --name-only)
for f in $staged; do
  case \"$f\" in
    .ratchet/cache/*|.ratchet/tmp/*|plans/*/scratch/*)
      echo \"ratchet: refusing to commit $f (cache/scratch content)\" >&2
      exit 1
      ;;
  esac
done
exit 0
";

/// Resources that must exist under [`CONTROL_DIR`], relative paths inside
/// the packaged bundle.
pub const REQUIRED_RESOURCES: &[&str] = &[
    "policy.md",
    "templates/plan.md",
    "templates/commands/plan.md",
    "templates/commands/tasks.md",
    "templates/commands/review.md",
];

/// Machine-generated pollution an earlier defect copied into managed
/// projects. These names — and only these — may be deleted by a migration.
pub const DELETABLE_POLLUTION: &[&str] = &[".rt-cache", "rt.lock", ".DS_Store"];

#[must_use]
pub fn is_pollution(name: &str) -> bool {
    DELETABLE_POLLUTION.contains(&name)
}

#[must_use]
pub fn control_dir(root: &Path) -> PathBuf {
    root.join(CONTROL_DIR)
}

#[must_use]
pub fn metadata_path(root: &Path) -> PathBuf {
    control_dir(root).join(META_FILE)
}

#[must_use]
pub fn has_legacy_plans_dir(root: &Path) -> bool {
    root.join(LEGACY_PLANS_DIR).is_dir()
}

#[must_use]
pub fn has_current_plans_dir(root: &Path) -> bool {
    root.join(PLANS_DIR).is_dir()
}

/// Required ignore entries missing from the tree's `.gitignore`.
///
/// A missing file counts as "all entries missing". Matching is by trimmed
/// whole line, so user comments or reordering never produce duplicates.
#[must_use]
pub fn missing_ignore_entries(root: &Path) -> Vec<&'static str> {
    let present: Vec<String> = fs::read_to_string(root.join(".gitignore"))
        .map(|s| s.lines().map(|l| l.trim().to_string()).collect())
        .unwrap_or_default();
    REQUIRED_IGNORE_ENTRIES
        .iter()
        .filter(|e| !present.iter().any(|line| line == *e))
        .copied()
        .collect()
}

/// Whether the pre-commit guard (identified by its marker line) is
/// installed in the given hooks directory.
#[must_use]
pub fn guard_installed(hooks_dir: &Path) -> bool {
    fs::read_to_string(hooks_dir.join("pre-commit"))
        .map(|s| s.contains(GUARD_MARKER))
        .unwrap_or(false)
}

/// Grouping folders that exist in this tree, as absolute paths.
#[must_use]
pub fn existing_group_dirs(root: &Path) -> Vec<PathBuf> {
    COMMAND_GROUP_DIRS
        .iter()
        .map(|d| root.join(d))
        .filter(|p| p.is_dir())
        .collect()
}

/// Grouping folders still holding a legacy command subdirectory.
#[must_use]
pub fn group_dirs_with_legacy_commands(root: &Path) -> Vec<PathBuf> {
    existing_group_dirs(root)
        .into_iter()
        .filter(|g| g.join(LEGACY_COMMAND_SUBDIR).is_dir())
        .collect()
}

/// Required bundled resources missing from the control directory.
///
/// A symlink counts as present without following it: in a worktree the
/// shared policy document is a link back to the primary tree and must not
/// be materialized locally.
#[must_use]
pub fn missing_resources(root: &Path) -> Vec<&'static str> {
    let control = control_dir(root);
    REQUIRED_RESOURCES
        .iter()
        .filter(|rel| {
            let path = control.join(rel);
            !path.is_symlink() && !path.exists()
        })
        .copied()
        .collect()
}
