//! Static, ordered catalogue of migration units.
//!
//! Discovery is an explicit registration table assembled once at process
//! start — no ambient lookup. Ordering key is target version, ties broken
//! by registration order.

use crate::{
    unit::MigrationUnit,
    units::{
        CompleteGitignore, InstallCommitGuard, RenameCommandDirs, RenamePlansDir,
        RestoreBundledTemplates,
    },
    version::LayoutVersion,
};

pub struct Registry {
    units: Vec<Box<dyn MigrationUnit>>,
}

impl Registry {
    #[must_use]
    pub fn empty() -> Self {
        Self { units: Vec::new() }
    }

    /// The full built-in catalogue, in registration order.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(RenamePlansDir));
        registry.register(Box::new(CompleteGitignore));
        registry.register(Box::new(InstallCommitGuard));
        registry.register(Box::new(RenameCommandDirs));
        registry.register(Box::new(RestoreBundledTemplates));
        registry
    }

    /// Register a unit. A duplicate id is a program-correctness bug, not a
    /// runtime condition, and panics at registration time.
    pub fn register(&mut self, unit: Box<dyn MigrationUnit>) {
        let id = unit.id();
        assert!(
            self.units.iter().all(|u| u.id() != id),
            "duplicate migration unit id: {id}"
        );
        self.units.push(unit);
    }

    #[must_use]
    pub fn all(&self) -> impl Iterator<Item = &dyn MigrationUnit> {
        self.units.iter().map(AsRef::as_ref)
    }

    /// Units whose target version lies in `(from, to]`, ascending by
    /// target version, registration order within a version.
    #[must_use]
    pub fn applicable(&self, from: LayoutVersion, to: LayoutVersion) -> Vec<&dyn MigrationUnit> {
        let mut units: Vec<&dyn MigrationUnit> = self
            .units
            .iter()
            .map(AsRef::as_ref)
            .filter(|u| u.target_version() > from && u.target_version() <= to)
            .collect();
        // Stable sort keeps registration order within a target version.
        units.sort_by_key(|u| u.target_version());
        units
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::version::{CURRENT_VERSION, EARLIEST_VERSION},
    };

    #[test]
    fn test_builtin_catalogue_is_ordered() {
        let registry = Registry::builtin();
        let ids: Vec<_> = registry
            .applicable(EARLIEST_VERSION, CURRENT_VERSION)
            .iter()
            .map(|u| u.id())
            .collect();
        assert_eq!(
            ids,
            vec![
                "rename-plans-dir",
                "complete-gitignore",
                "install-commit-guard",
                "rename-command-dirs",
                "restore-bundled-templates",
            ]
        );
    }

    #[test]
    fn test_applicable_is_half_open() {
        let registry = Registry::builtin();
        // (0.2.0, 0.3.0]: excludes the 0.2.0 unit, includes both 0.3.0 units.
        let ids: Vec<_> = registry
            .applicable(LayoutVersion::new(0, 2, 0), LayoutVersion::new(0, 3, 0))
            .iter()
            .map(|u| u.id())
            .collect();
        assert_eq!(ids, vec!["complete-gitignore", "install-commit-guard"]);
    }

    #[test]
    fn test_applicable_empty_when_current() {
        let registry = Registry::builtin();
        assert!(
            registry
                .applicable(CURRENT_VERSION, CURRENT_VERSION)
                .is_empty()
        );
    }

    #[test]
    #[should_panic(expected = "duplicate migration unit id")]
    fn test_duplicate_id_panics() {
        let mut registry = Registry::builtin();
        registry.register(Box::new(RenamePlansDir));
    }
}
