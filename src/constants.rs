//! Constants for the `git-review` application.

use nu_ansi_term::Color;

pub(crate) const CFG_FILE_NAME: &str = ".git-review.toml";
pub(crate) const GIT_CONFIG_SECTION: &str = "review";

pub(crate) const DEFAULT_UPSTREAM: &str = "main";
pub(crate) const DEFAULT_REMOTE: &str = "origin";
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Length of the random token that keeps review branch names unique.
pub(crate) const BRANCH_TOKEN_LENGTH: usize = 8;
/// Length of abbreviated commit hashes in user-facing output.
pub(crate) const SHORT_HASH_LENGTH: usize = 7;

pub(crate) const COLORS: [Color; 6] = [
    Color::Blue,
    Color::Cyan,
    Color::Green,
    Color::Red,
    Color::Yellow,
    Color::Purple,
];

pub(crate) const FILLED_CIRCLE: char = '●';
pub(crate) const EMPTY_CIRCLE: char = '○';
pub(crate) const BOTTOM_LEFT_BOX: char = '└';
pub(crate) const LEFT_FORK_BOX: char = '├';
pub(crate) const VERTICAL_BOX: char = '│';
pub(crate) const HORIZONTAL_BOX: char = '─';
