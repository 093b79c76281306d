//! Unit (0.3.0): install the protective pre-commit guard.
//!
//! A hook already carrying our marker is satisfied. An unrelated
//! pre-existing hook is never clobbered: the guard block is appended to it
//! (minus the shebang) so both keep running.

use std::fs;

use crate::{
    error::Result,
    layout::{GUARD_SCRIPT, guard_installed},
    unit::{Applicability, ApplyOutcome, Change, MigrationUnit, TreeContext},
    version::LayoutVersion,
};

pub struct InstallCommitGuard;

impl MigrationUnit for InstallCommitGuard {
    fn id(&self) -> &'static str {
        "install-commit-guard"
    }

    fn description(&self) -> &'static str {
        "install the ratchet pre-commit guard hook"
    }

    fn target_version(&self) -> LayoutVersion {
        LayoutVersion::new(0, 3, 0)
    }

    fn can_apply(&self, tree: &TreeContext) -> Result<Applicability> {
        if guard_installed(&tree.hooks_dir) {
            return Ok(Applicability::satisfied("guard marker already present"));
        }
        if tree.hooks_dir.join("pre-commit").exists() {
            Ok(Applicability::needed(
                "unrelated pre-commit hook present, guard will be appended",
            ))
        } else {
            Ok(Applicability::needed("no pre-commit hook installed"))
        }
    }

    fn apply(&self, tree: &TreeContext, dry_run: bool) -> Result<ApplyOutcome> {
        let hook = tree.hooks_dir.join("pre-commit");
        if guard_installed(&tree.hooks_dir) {
            return Ok(ApplyOutcome::default());
        }

        let change = if hook.exists() {
            Change::Appended { path: hook.clone() }
        } else {
            Change::Created { path: hook.clone() }
        };

        if !dry_run {
            fs::create_dir_all(&tree.hooks_dir)?;
            if hook.exists() {
                let mut content = fs::read_to_string(&hook)?;
                if !content.ends_with('\n') {
                    content.push('\n');
                }
                content.push('\n');
                content.push_str(guard_block());
                fs::write(&hook, content)?;
            } else {
                fs::write(&hook, GUARD_SCRIPT)?;
            }
            mark_executable(&hook)?;
        }

        Ok(ApplyOutcome {
            changes: vec![change],
        })
    }
}

/// The guard script without its shebang line, for appending to an
/// existing hook.
fn guard_block() -> &'static str {
    GUARD_SCRIPT
        .split_once('\n')
        .map(|(_, rest)| rest)
        .unwrap_or(GUARD_SCRIPT)
}

#[cfg(unix)]
fn mark_executable(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn mark_executable(_path: &std::path::Path) -> Result<()> {
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::layout::GUARD_MARKER};

    #[test]
    fn test_installs_fresh_hook() {
        let dir = tempfile::tempdir().unwrap();
        let tree = TreeContext::new(dir.path());
        let unit = InstallCommitGuard;
        assert!(unit.can_apply(&tree).unwrap().applicable);

        unit.apply(&tree, false).unwrap();

        let hook = tree.hooks_dir.join("pre-commit");
        let content = fs::read_to_string(&hook).unwrap();
        assert!(content.starts_with("#!/bin/sh"));
        assert!(content.contains(GUARD_MARKER));
        assert!(!unit.can_apply(&tree).unwrap().applicable);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&hook).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn test_appends_to_unrelated_hook() {
        let dir = tempfile::tempdir().unwrap();
        let tree = TreeContext::new(dir.path());
        fs::create_dir_all(&tree.hooks_dir).unwrap();
        let hook = tree.hooks_dir.join("pre-commit");
        fs::write(&hook, "#!/bin/sh\nmake lint\n").unwrap();

        InstallCommitGuard.apply(&tree, false).unwrap();

        let content = fs::read_to_string(&hook).unwrap();
        // The user's hook body survives, followed by our guard.
        assert!(content.starts_with("#!/bin/sh\nmake lint\n"));
        assert!(content.contains(GUARD_MARKER));
        // Exactly one shebang.
        assert_eq!(content.matches("#!/bin/sh").count(), 1);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let tree = TreeContext::new(dir.path());
        let outcome = InstallCommitGuard.apply(&tree, true).unwrap();
        assert_eq!(outcome.files_changed(), 1);
        assert!(!tree.hooks_dir.join("pre-commit").exists());
    }
}
