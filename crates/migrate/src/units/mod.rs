//! The built-in migration units, one module per transformation.

pub mod command_dirs;
pub mod commit_guard;
pub mod gitignore;
pub mod plans_dir;
pub mod templates;

pub use {
    command_dirs::RenameCommandDirs, commit_guard::InstallCommitGuard,
    gitignore::CompleteGitignore, plans_dir::RenamePlansDir, templates::RestoreBundledTemplates,
};
