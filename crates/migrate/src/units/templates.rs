//! Unit (0.4.0): restore required bundled resources under `.ratchet/`.
//!
//! Missing resources are copied from the packaged bundle. A resource that
//! is already a symlink — the shared policy document in a worktree, linked
//! back to the primary tree — counts as present and is never duplicated
//! locally. If the bundle cannot be located the unit fails closed: a
//! silently incomplete tree is worse than a halted upgrade.

use std::fs;

use crate::{
    error::{Error, Result},
    layout::{self, CONTROL_DIR},
    unit::{Applicability, ApplyOutcome, Change, MigrationUnit, TreeContext},
    version::LayoutVersion,
};

pub struct RestoreBundledTemplates;

impl MigrationUnit for RestoreBundledTemplates {
    fn id(&self) -> &'static str {
        "restore-bundled-templates"
    }

    fn description(&self) -> &'static str {
        "restore missing bundled templates and the policy document"
    }

    fn target_version(&self) -> LayoutVersion {
        LayoutVersion::new(0, 4, 0)
    }

    fn can_apply(&self, tree: &TreeContext) -> Result<Applicability> {
        let missing = layout::missing_resources(&tree.root);
        if missing.is_empty() {
            Ok(Applicability::satisfied("all bundled resources present"))
        } else {
            Ok(Applicability::needed(format!(
                "missing resources: {}",
                missing.join(", ")
            )))
        }
    }

    fn apply(&self, tree: &TreeContext, dry_run: bool) -> Result<ApplyOutcome> {
        let missing = layout::missing_resources(&tree.root);
        if missing.is_empty() {
            return Ok(ApplyOutcome::default());
        }

        let Some(bundle) = tree.bundle.locate() else {
            return Err(Error::BundleUnavailable {
                detail: "packaged resource bundle could not be located".into(),
            });
        };

        // Resolve everything before writing anything: a bundle missing
        // even one resource must fail closed, not leave a half-restored
        // control directory behind.
        let control = tree.root.join(CONTROL_DIR);
        let mut resolved = Vec::new();
        for rel in missing {
            let Some(content) = bundle.read(rel) else {
                return Err(Error::BundleUnavailable {
                    detail: format!("bundle at {} has no `{rel}`", bundle.describe()),
                });
            };
            resolved.push((control.join(rel), content));
        }

        let mut changes = Vec::new();
        for (path, content) in resolved {
            if !dry_run {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&path, content)?;
            }
            changes.push(Change::Created { path });
        }

        Ok(ApplyOutcome { changes })
    }
}
