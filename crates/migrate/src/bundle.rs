//! Packaged-resource bundle: embedded (release) or filesystem (override).
//!
//! The templates and policy document a managed project needs are embedded
//! into the binary via `include_dir!`. `RATCHET_BUNDLE_DIR` overrides this
//! with an on-disk directory, for development and for packagers that ship
//! resources next to the binary. An override that points nowhere resolves
//! to "absent" — the templates unit then fails closed instead of silently
//! leaving a tree incomplete.

use std::path::PathBuf;

use tracing::{debug, warn};

static EMBEDDED: include_dir::Dir = include_dir::include_dir!("$CARGO_MANIFEST_DIR/assets");

/// Env var naming an on-disk bundle directory that replaces the embedded one.
pub const BUNDLE_DIR_ENV: &str = "RATCHET_BUNDLE_DIR";

/// A located bundle, readable by bundle-relative path.
#[derive(Debug, Clone)]
pub enum Bundle {
    Embedded,
    Dir(PathBuf),
}

impl Bundle {
    /// Read one resource. `None` if the bundle has no file at `rel`.
    #[must_use]
    pub fn read(&self, rel: &str) -> Option<Vec<u8>> {
        match self {
            Self::Embedded => EMBEDDED.get_file(rel).map(|f| f.contents().to_vec()),
            Self::Dir(dir) => std::fs::read(dir.join(rel)).ok(),
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Embedded => "embedded".into(),
            Self::Dir(dir) => dir.display().to_string(),
        }
    }
}

/// Seam for locating the packaged bundle. The default implementation is
/// [`DistBundle`]; tests substitute an always-absent locator to exercise
/// the fail-closed path.
pub trait BundleLocator: Send + Sync {
    fn locate(&self) -> Option<Bundle>;
}

/// Production locator: env override, else embedded assets.
#[derive(Debug, Default)]
pub struct DistBundle;

impl BundleLocator for DistBundle {
    fn locate(&self) -> Option<Bundle> {
        if let Ok(dir) = std::env::var(BUNDLE_DIR_ENV) {
            let path = PathBuf::from(dir);
            if path.is_dir() {
                debug!(path = %path.display(), "using bundle directory override");
                return Some(Bundle::Dir(path));
            }
            // An explicit override that is wrong must not silently fall
            // back to stale embedded content.
            warn!(path = %path.display(), "bundle directory override does not exist");
            return None;
        }
        Some(Bundle::Embedded)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::layout::REQUIRED_RESOURCES};

    #[test]
    fn test_embedded_bundle_carries_every_required_resource() {
        let bundle = Bundle::Embedded;
        for rel in REQUIRED_RESOURCES {
            assert!(bundle.read(rel).is_some(), "missing embedded resource {rel}");
        }
    }

    #[test]
    fn test_embedded_bundle_unknown_path() {
        assert!(Bundle::Embedded.read("no/such/file.md").is_none());
    }

    #[test]
    fn test_dir_bundle_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("policy.md"), "local policy").unwrap();
        let bundle = Bundle::Dir(dir.path().to_path_buf());
        assert_eq!(bundle.read("policy.md").unwrap(), b"local policy");
        assert!(bundle.read("templates/plan.md").is_none());
    }
}
