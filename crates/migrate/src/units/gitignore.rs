//! Unit (0.3.0): ensure `.gitignore` carries every required entry.
//!
//! Appends only what is missing, creating the file if absent. User lines,
//! ordering, and comments are never touched.

use std::fs;

use crate::{
    error::Result,
    layout,
    unit::{Applicability, ApplyOutcome, Change, MigrationUnit, TreeContext},
    version::LayoutVersion,
};

pub struct CompleteGitignore;

impl MigrationUnit for CompleteGitignore {
    fn id(&self) -> &'static str {
        "complete-gitignore"
    }

    fn description(&self) -> &'static str {
        "append required ratchet entries to .gitignore"
    }

    fn target_version(&self) -> LayoutVersion {
        LayoutVersion::new(0, 3, 0)
    }

    fn can_apply(&self, tree: &TreeContext) -> Result<Applicability> {
        let missing = layout::missing_ignore_entries(&tree.root);
        if missing.is_empty() {
            Ok(Applicability::satisfied("all required entries present"))
        } else {
            Ok(Applicability::needed(format!(
                "missing entries: {}",
                missing.join(", ")
            )))
        }
    }

    fn apply(&self, tree: &TreeContext, dry_run: bool) -> Result<ApplyOutcome> {
        let path = tree.root.join(".gitignore");
        let missing = layout::missing_ignore_entries(&tree.root);
        if missing.is_empty() {
            return Ok(ApplyOutcome::default());
        }

        let change = if path.exists() {
            Change::Appended { path: path.clone() }
        } else {
            Change::Created { path: path.clone() }
        };

        if !dry_run {
            let mut content = fs::read_to_string(&path).unwrap_or_default();
            if !content.is_empty() && !content.ends_with('\n') {
                content.push('\n');
            }
            content.push_str("# ratchet\n");
            for entry in &missing {
                content.push_str(entry);
                content.push('\n');
            }
            fs::write(&path, content)?;
        }

        Ok(ApplyOutcome {
            changes: vec![change],
        })
    }
}
