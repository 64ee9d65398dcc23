//! Error types for the `git-review` application.

use nu_ansi_term::Color;
use thiserror::Error;

/// Errors raised by the stack, sync and export engines.
#[derive(Error, Debug)]
pub enum ReviewError {
    /// The working branch does not form a linear stack on top of upstream.
    #[error("History inconsistency: {}", .0)]
    HistoryInconsistency(String),
    /// A review branch was changed by someone other than `git-review`.
    #[error(
        "Branch `{}` was modified remotely (now at `{}`). Refusing to overwrite it.",
        Color::Blue.paint(.branch),
        .tip
    )]
    ForeignDivergence { branch: String, tip: String },
    /// The hosting service or remote could not be reached in time.
    #[error("Network failure: {}", .0)]
    NetworkFailure(String),
    /// The version-control engine stopped on a conflict.
    #[error(
        "Rebase stopped on a conflict ({}). Resolve it, run `git rebase --continue`, then retry.",
        .0
    )]
    RebaseConflict(String),
    /// The working tree has uncommitted changes.
    #[error("Your working directory is dirty.")]
    WorkingTreeDirty,
    /// HEAD is not the configured working branch.
    #[error(
        "You must be on your working branch `{}` (currently on `{}`).",
        Color::Blue.paint(.expected),
        .actual
    )]
    NotOnWorkingBranch { expected: String, actual: String },
    /// Required configuration is missing.
    #[error("Configuration not initialized: {}", .0)]
    ConfigNotInitialized(String),
    /// A [git2::Error] occurred.
    #[error("libgit2 error: {}", .0)]
    Git2(#[from] git2::Error),
    /// An [octocrab::Error] occurred.
    #[error("GitHub error: {}", .0)]
    GitHub(#[from] octocrab::Error),
    /// An [std::io::Error] occurred.
    #[error("I/O error: {}", .0)]
    Io(#[from] std::io::Error),
    /// The configuration file could not be parsed.
    #[error("config parse error: {}", .0)]
    ConfigParse(#[from] toml::de::Error),
    /// The configuration file could not be written.
    #[error("config write error: {}", .0)]
    ConfigWrite(#[from] toml::ser::Error),
    /// An [inquire::InquireError] occurred.
    #[error("inquire error: {}", .0)]
    Inquire(#[from] inquire::InquireError),
}

impl ReviewError {
    /// Returns `true` if the error concerns a single stack entry. Such errors are reported and
    /// the export moves on to the next entry.
    pub fn is_entry_scoped(&self) -> bool {
        matches!(
            self,
            Self::ForeignDivergence { .. } | Self::NetworkFailure(_) | Self::GitHub(_)
        )
    }
}

pub type ReviewResult<T> = Result<T, ReviewError>;
