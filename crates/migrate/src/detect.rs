//! Version detection: authoritative metadata first, filesystem heuristics
//! second.
//!
//! Heuristics are a prioritized signal list, each mapping a structural
//! signature to a candidate version. When signals conflict (legacy and
//! current structures coexist) the lowest candidate wins, so no migration
//! is ever skipped. Detection never mutates the tree.

use tracing::debug;

use crate::{
    layout,
    metadata::ProjectMetadata,
    unit::TreeContext,
    version::{CURRENT_VERSION, LayoutVersion},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Metadata,
    Heuristic,
}

/// Outcome of version detection. "No confidence" is an explicit variant,
/// never a null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Detection {
    Version {
        version: LayoutVersion,
        source: DetectionSource,
        /// Whether every heuristic signal agreed (always true for
        /// metadata-sourced results).
        unanimous: bool,
    },
    Unknown,
}

impl Detection {
    #[must_use]
    pub fn version(&self) -> Option<LayoutVersion> {
        match self {
            Self::Version { version, .. } => Some(*version),
            Self::Unknown => None,
        }
    }
}

/// One structural signal and the version it argues for.
#[derive(Debug)]
struct Signal {
    version: LayoutVersion,
    reason: &'static str,
}

/// Detect the layout version of a tree.
///
/// A present metadata record is authoritative as long as its version is
/// one this build knows about; a version from the future is untrusted and
/// falls back to heuristics like a missing record would.
#[must_use]
pub fn detect(tree: &TreeContext, metadata: Option<&ProjectMetadata>) -> Detection {
    if let Some(meta) = metadata {
        if meta.version <= CURRENT_VERSION {
            return Detection::Version {
                version: meta.version,
                source: DetectionSource::Metadata,
                unanimous: true,
            };
        }
        debug!(
            version = %meta.version,
            "metadata claims a future layout version, falling back to heuristics"
        );
    }

    let signals = collect_signals(tree);
    for s in &signals {
        debug!(version = %s.version, reason = s.reason, "detection signal");
    }

    let Some(lowest) = signals.iter().map(|s| s.version).min() else {
        return Detection::Unknown;
    };
    let unanimous = signals.iter().all(|s| s.version == lowest);
    Detection::Version {
        version: lowest,
        source: DetectionSource::Heuristic,
        unanimous,
    }
}

fn collect_signals(tree: &TreeContext) -> Vec<Signal> {
    let root = &tree.root;
    let mut signals = Vec::new();

    if layout::has_legacy_plans_dir(root) {
        signals.push(Signal {
            version: LayoutVersion::new(0, 1, 0),
            reason: "legacy blueprints/ directory present",
        });
    }

    if layout::has_current_plans_dir(root) {
        // A current plan directory means at least 0.2.0; refine upward as
        // long as each newer layer's structure is complete.
        let mut version = LayoutVersion::new(0, 2, 0);
        let mut reason = "plans/ directory present";
        if layout::missing_ignore_entries(root).is_empty()
            && layout::guard_installed(&tree.hooks_dir)
        {
            version = LayoutVersion::new(0, 3, 0);
            reason = "ignore entries complete and commit guard installed";
            if layout::group_dirs_with_legacy_commands(root).is_empty()
                && layout::missing_resources(root).is_empty()
            {
                version = LayoutVersion::new(0, 4, 0);
                reason = "command directories and bundled resources current";
            }
        }
        signals.push(Signal { version, reason });
    }

    if !layout::group_dirs_with_legacy_commands(root).is_empty() {
        // A legacy rt/ command subdir exists in layouts up to 0.3.0.
        signals.push(Signal {
            version: LayoutVersion::new(0, 3, 0),
            reason: "legacy rt/ command subdirectory present",
        });
    }

    signals
}
