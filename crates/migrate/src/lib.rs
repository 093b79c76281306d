//! Layout migration engine for ratchet-managed project trees.
//!
//! A scaffolded project's on-disk layout evolves across tool releases:
//! directory names, protective git hooks, ignore-file entries, bundled
//! resources. This crate detects which layout version a tree is at
//! (authoritative metadata first, filesystem heuristics second), plans the
//! ordered set of idempotent migration units that bring it to the current
//! layout, applies them with per-unit persistence, and fans the same
//! upgrade out across every linked git worktree independently.

pub mod bundle;
pub mod detect;
pub mod error;
pub mod layout;
pub mod metadata;
pub mod registry;
pub mod runner;
pub mod unit;
pub mod units;
pub mod version;
pub mod worktree;

pub use {
    bundle::{Bundle, BundleLocator, DistBundle},
    detect::{Detection, DetectionSource, detect},
    error::{Error, Result},
    metadata::{MetadataStore, MigrationRecord, MigrationResult, ProjectMetadata},
    registry::Registry,
    runner::{Runner, SkippedUnit, TreeReport, UpgradeOptions},
    unit::{Applicability, ApplyOutcome, Change, MigrationUnit, TreeContext},
    version::{CURRENT_VERSION, EARLIEST_VERSION, LayoutVersion},
    worktree::{
        Coordinator, TreeStatus, UpgradeReport, UpgradeStatus, WorktreeDescriptor, list_worktrees,
    },
};
