//! Per-tree migration runner: detect → plan → apply → finalize.
//!
//! Metadata is persisted after every unit outcome, so a crash mid-chain
//! leaves a resumable state: the next run skips recorded successes and
//! retries the failure. Failure halts the remaining chain for this tree;
//! there is no rollback — idempotent units plus the skip rule are the
//! safety net.

use std::path::PathBuf;

use {
    serde::Serialize,
    tracing::{debug, info, warn},
};

use crate::{
    detect::{Detection, detect},
    error::{Error, Result},
    metadata::{MetadataStore, MigrationResult, ProjectMetadata},
    registry::Registry,
    unit::{Change, MigrationUnit, TreeContext},
    version::{CURRENT_VERSION, EARLIEST_VERSION, LayoutVersion},
};

#[derive(Debug, Clone, Copy)]
pub struct UpgradeOptions {
    pub target: LayoutVersion,
    pub dry_run: bool,
    /// Suppresses interactive confirmation (a CLI concern) and overrides
    /// an `Unknown` detection by assuming the least-upgraded layout.
    pub force: bool,
    pub include_worktrees: bool,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        Self {
            target: CURRENT_VERSION,
            dry_run: false,
            force: false,
            include_worktrees: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedUnit {
    pub id: String,
    pub reason: String,
}

/// Everything one tree's upgrade did (or, under dry-run, would do).
#[derive(Debug, Serialize)]
pub struct TreeReport {
    pub root: PathBuf,
    pub detection: Detection,
    pub metadata_created: bool,
    pub applied: Vec<String>,
    pub skipped: Vec<SkippedUnit>,
    pub changes: Vec<Change>,
    pub error: Option<String>,
}

impl TreeReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// A report for a tree whose upgrade could not even start.
    #[must_use]
    pub fn failed(root: PathBuf, error: String) -> Self {
        Self {
            root,
            detection: Detection::Unknown,
            metadata_created: false,
            applied: Vec::new(),
            skipped: Vec::new(),
            changes: Vec::new(),
            error: Some(error),
        }
    }
}

pub struct Runner<'a> {
    registry: &'a Registry,
    tree: TreeContext,
}

impl<'a> Runner<'a> {
    #[must_use]
    pub fn new(registry: &'a Registry, tree: TreeContext) -> Self {
        Self { registry, tree }
    }

    /// Upgrade this one tree to `opts.target`.
    ///
    /// Returns `Err` only for precondition problems (unrecognized tree,
    /// duplicate history records); a migration-unit failure is captured in
    /// the report so the coordinator can keep upgrading siblings.
    pub fn upgrade(&self, opts: &UpgradeOptions) -> Result<TreeReport> {
        let root = &self.tree.root;
        let store = MetadataStore::for_root(root);
        let existing = store.load();
        let detection = detect(&self.tree, existing.as_ref());

        let from = match detection.version() {
            Some(v) => v,
            None if opts.force => {
                warn!(root = %root.display(), "layout unknown, --force assumes the earliest layout");
                EARLIEST_VERSION
            },
            None => {
                return Err(Error::UnrecognizedProject { path: root.clone() });
            },
        };
        debug!(root = %root.display(), from = %from, target = %opts.target, "planning upgrade");

        let metadata_created = existing.is_none();
        let mut metadata = existing.unwrap_or_else(|| ProjectMetadata::new(from));
        let plan: Vec<&dyn MigrationUnit> = self
            .registry
            .applicable(from, opts.target)
            .into_iter()
            .filter(|u| !metadata.has_migration(u.id()))
            .collect();

        let mut report = TreeReport {
            root: root.clone(),
            detection,
            metadata_created,
            applied: Vec::new(),
            skipped: Vec::new(),
            changes: Vec::new(),
            error: None,
        };

        for unit in plan {
            let id = unit.id();
            let outcome = unit
                .can_apply(&self.tree)
                .and_then(|app| {
                    if app.applicable {
                        info!(id, root = %root.display(), "applying migration");
                        unit.apply(&self.tree, opts.dry_run).map(Some)
                    } else {
                        debug!(id, reason = %app.reason, "migration not applicable");
                        report.skipped.push(SkippedUnit {
                            id: id.into(),
                            reason: app.reason,
                        });
                        Ok(None)
                    }
                });
            match outcome {
                Ok(Some(outcome)) => {
                    report.applied.push(id.into());
                    if !opts.dry_run {
                        metadata.record_migration(id, MigrationResult::Success, outcome.summary())?;
                        store.save(&metadata)?;
                    }
                    report.changes.extend(outcome.changes);
                },
                Ok(None) => {},
                Err(e) => {
                    let failure = Error::unit_failed(id, root.clone(), e.to_string());
                    warn!(id, root = %root.display(), error = %e, "migration failed, halting chain");
                    if !opts.dry_run {
                        metadata.record_migration(id, MigrationResult::Failure, e.to_string())?;
                        store.save(&metadata)?;
                    }
                    report.error = Some(failure.to_string());
                    break;
                },
            }
        }

        if report.error.is_none() && !opts.dry_run {
            // A target below the detected version runs no units and must
            // not move the recorded version backward.
            metadata.version = metadata.version.max(opts.target);
            store.save(&metadata)?;
        }
        Ok(report)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::fs;

    use {
        super::*,
        crate::{
            layout::{GUARD_SCRIPT, REQUIRED_IGNORE_ENTRIES, REQUIRED_RESOURCES},
            unit::{Applicability, ApplyOutcome},
        },
    };

    fn legacy_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("blueprints")).unwrap();
        fs::write(dir.path().join("blueprints/plan.md"), "p").unwrap();
        dir
    }

    fn scaffold_current(root: &std::path::Path) {
        fs::create_dir_all(root.join("plans")).unwrap();
        fs::write(
            root.join(".gitignore"),
            REQUIRED_IGNORE_ENTRIES.join("\n") + "\n",
        )
        .unwrap();
        let hooks = root.join(".git/hooks");
        fs::create_dir_all(&hooks).unwrap();
        fs::write(hooks.join("pre-commit"), GUARD_SCRIPT).unwrap();
        for rel in REQUIRED_RESOURCES {
            let path = root.join(".ratchet").join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "x").unwrap();
        }
    }

    fn run(root: &std::path::Path, opts: &UpgradeOptions) -> TreeReport {
        let registry = Registry::builtin();
        Runner::new(&registry, TreeContext::new(root))
            .upgrade(opts)
            .unwrap()
    }

    #[test]
    fn test_full_legacy_to_current_chain() {
        let dir = legacy_tree();
        // Give the tree a legacy command dir so every unit applies.
        fs::create_dir_all(dir.path().join(".claude/commands/rt")).unwrap();
        fs::write(dir.path().join(".claude/commands/rt/plan.md"), "old").unwrap();

        let report = run(dir.path(), &UpgradeOptions::default());
        assert!(report.succeeded());
        // Every unit in range, in ascending target order.
        assert_eq!(
            report.applied,
            vec![
                "rename-plans-dir",
                "complete-gitignore",
                "install-commit-guard",
                "rename-command-dirs",
                "restore-bundled-templates",
            ]
        );
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_scenario_one_legacy_rename_with_metadata() {
        let dir = legacy_tree();
        let report = run(dir.path(), &UpgradeOptions::default());
        assert!(report.succeeded());

        assert!(!dir.path().join("blueprints").exists());
        assert!(dir.path().join("plans/plan.md").exists());

        let meta = MetadataStore::for_root(dir.path()).load().unwrap();
        assert_eq!(meta.version, CURRENT_VERSION);
        assert!(meta.has_migration("rename-plans-dir"));
        assert!(report.metadata_created);
    }

    #[test]
    fn test_scenario_two_current_tree_gets_metadata_only() {
        let dir = tempfile::tempdir().unwrap();
        scaffold_current(dir.path());

        let report = run(dir.path(), &UpgradeOptions::default());
        assert!(report.succeeded());
        assert!(report.applied.is_empty());
        assert!(report.changes.is_empty());
        assert!(report.metadata_created);

        let meta = MetadataStore::for_root(dir.path()).load().unwrap();
        assert_eq!(meta.version, CURRENT_VERSION);
        assert!(meta.migrations.is_empty());
    }

    #[test]
    fn test_idempotent_rerun_applies_nothing() {
        let dir = legacy_tree();
        let first = run(dir.path(), &UpgradeOptions::default());
        assert!(first.succeeded());
        let count = MetadataStore::for_root(dir.path())
            .load()
            .unwrap()
            .migrations
            .len();

        let second = run(dir.path(), &UpgradeOptions::default());
        assert!(second.succeeded());
        assert!(second.applied.is_empty());

        // Monotonic history: count never decreases, and an idempotent
        // re-run leaves it unchanged.
        let meta = MetadataStore::for_root(dir.path()).load().unwrap();
        assert_eq!(meta.migrations.len(), count);
        assert_eq!(meta.version, CURRENT_VERSION);
    }

    #[test]
    fn test_scenario_four_dry_run_matches_real_run() {
        let dir = legacy_tree();
        let dry = run(
            dir.path(),
            &UpgradeOptions {
                dry_run: true,
                ..Default::default()
            },
        );
        // Dry run leaves the tree byte-identical: no metadata, no rename.
        assert!(MetadataStore::for_root(dir.path()).load().is_none());
        assert!(dir.path().join("blueprints/plan.md").exists());

        let real = run(dir.path(), &UpgradeOptions::default());
        assert_eq!(dry.applied, real.applied);
    }

    #[test]
    fn test_unknown_tree_requires_force() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "not ours").unwrap();

        let registry = Registry::builtin();
        let runner = Runner::new(&registry, TreeContext::new(dir.path()));
        let err = runner.upgrade(&UpgradeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnrecognizedProject { .. }));

        // Force assumes the earliest layout and runs what applies.
        let report = runner
            .upgrade(&UpgradeOptions {
                force: true,
                ..Default::default()
            })
            .unwrap();
        assert!(report.succeeded());
        // The rename unit legitimately did not apply (no blueprints/).
        assert!(report.skipped.iter().any(|s| s.id == "rename-plans-dir"));
    }

    #[test]
    fn test_targeted_upgrade_stops_at_target() {
        let dir = legacy_tree();
        let report = run(
            dir.path(),
            &UpgradeOptions {
                target: LayoutVersion::new(0, 2, 0),
                ..Default::default()
            },
        );
        assert!(report.succeeded());
        assert_eq!(report.applied, vec!["rename-plans-dir".to_string()]);

        let meta = MetadataStore::for_root(dir.path()).load().unwrap();
        assert_eq!(meta.version, LayoutVersion::new(0, 2, 0));
        // Newer layers untouched.
        assert!(!dir.path().join(".gitignore").exists());
    }

    #[test]
    fn test_target_below_current_never_downgrades() {
        let dir = legacy_tree();
        assert!(run(dir.path(), &UpgradeOptions::default()).succeeded());

        // Asking a fully upgraded tree for an older target is a no-op;
        // the recorded version stays where it is.
        let report = run(
            dir.path(),
            &UpgradeOptions {
                target: LayoutVersion::new(0, 2, 0),
                ..Default::default()
            },
        );
        assert!(report.succeeded());
        assert!(report.applied.is_empty());

        let meta = MetadataStore::for_root(dir.path()).load().unwrap();
        assert_eq!(meta.version, CURRENT_VERSION);
    }

    // A unit that always fails, for halt-and-resume coverage.
    struct ExplodingUnit;

    impl MigrationUnit for ExplodingUnit {
        fn id(&self) -> &'static str {
            "exploding-unit"
        }
        fn description(&self) -> &'static str {
            "always fails"
        }
        fn target_version(&self) -> LayoutVersion {
            LayoutVersion::new(0, 2, 5)
        }
        fn can_apply(&self, _tree: &TreeContext) -> Result<Applicability> {
            Ok(Applicability::needed("always"))
        }
        fn apply(&self, _tree: &TreeContext, _dry_run: bool) -> Result<ApplyOutcome> {
            Err(std::io::Error::other("disk on fire").into())
        }
    }

    #[test]
    fn test_failure_halts_chain_and_is_recorded() {
        let dir = legacy_tree();
        let mut registry = Registry::builtin();
        registry.register(Box::new(ExplodingUnit));

        let runner = Runner::new(&registry, TreeContext::new(dir.path()));
        let report = runner.upgrade(&UpgradeOptions::default()).unwrap();

        assert!(!report.succeeded());
        let error = report.error.unwrap();
        assert!(error.contains("exploding-unit"));
        // The 0.2.0 unit ran before the failure; 0.3.0+ units did not.
        assert_eq!(report.applied, vec!["rename-plans-dir".to_string()]);
        assert!(!dir.path().join(".gitignore").exists());

        // The failure is on the permanent record, and the prior success
        // survives so a re-run resumes instead of redoing it.
        let meta = MetadataStore::for_root(dir.path()).load().unwrap();
        assert!(meta.has_migration("rename-plans-dir"));
        assert!(
            meta.migrations
                .iter()
                .any(|r| r.id == "exploding-unit" && r.result == MigrationResult::Failure)
        );
    }

    #[test]
    fn test_resume_after_failure_skips_completed_work() {
        let dir = legacy_tree();
        let mut registry = Registry::builtin();
        registry.register(Box::new(ExplodingUnit));
        let runner = Runner::new(&registry, TreeContext::new(dir.path()));
        let first = runner.upgrade(&UpgradeOptions::default()).unwrap();
        assert!(!first.succeeded());

        // "Fix the cause" by re-running against the catalogue without the
        // broken unit; completed work is skipped, the rest proceeds.
        let fixed = Registry::builtin();
        let report = Runner::new(&fixed, TreeContext::new(dir.path()))
            .upgrade(&UpgradeOptions::default())
            .unwrap();
        assert!(report.succeeded());
        assert!(!report.applied.contains(&"rename-plans-dir".to_string()));
        assert!(report.applied.contains(&"complete-gitignore".to_string()));

        let meta = MetadataStore::for_root(dir.path()).load().unwrap();
        assert_eq!(meta.version, CURRENT_VERSION);
    }
}
