//! The hosting-service seam: remote branch tips and pull requests.

use crate::errors::{ReviewError, ReviewResult};
use async_trait::async_trait;
use std::{fmt::Display, future::Future, time::Duration};

mod github;
pub use github::GitHub;

/// The lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
}

impl Display for PullRequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

/// A pull request as mirrored from the hosting service.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PullRequest {
    /// The pull request number.
    pub number: u64,
    /// The branch the pull request merges into.
    pub base: String,
    /// The review branch holding the change.
    pub head: String,
    /// The title of the pull request.
    pub title: String,
    /// Open, closed or merged.
    pub state: PullRequestState,
    /// Whether the pull request is a draft.
    pub draft: bool,
    /// Link to the pull request.
    pub url: String,
}

/// Metadata for a pull request about to be opened.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// The operations `git-review` consumes from the hosting service.
#[async_trait]
pub trait Host: Send + Sync {
    /// Returns the current tip of `branch` on the remote, or [None] if the branch does not exist.
    async fn branch_tip(&self, branch: &str) -> ReviewResult<Option<String>>;

    /// Opens a pull request.
    async fn create_pull_request(&self, request: &NewPullRequest) -> ReviewResult<PullRequest>;

    /// Changes the base branch of an existing pull request.
    async fn update_pull_request_base(&self, number: u64, base: &str)
        -> ReviewResult<PullRequest>;

    /// Fetches a pull request by number.
    async fn get_pull_request(&self, number: u64) -> ReviewResult<PullRequest>;

    /// Finds the open pull request whose head is `head`, if any.
    async fn find_pull_request(&self, head: &str) -> ReviewResult<Option<PullRequest>>;

    /// Returns the title of issue `number`.
    async fn issue_title(&self, number: u64) -> ReviewResult<String>;

    /// Returns the link to a pull request.
    fn pull_request_url(&self, number: u64) -> String;
}

/// Bounds a hosting-service call by `duration`. Running out of time is a
/// [ReviewError::NetworkFailure].
pub async fn with_timeout<T, F>(duration: Duration, what: &str, call: F) -> ReviewResult<T>
where
    F: Future<Output = ReviewResult<T>>,
{
    tokio::time::timeout(duration, call).await.map_err(|_| {
        ReviewError::NetworkFailure(format!(
            "{} timed out after {}s",
            what,
            duration.as_secs_f32()
        ))
    })?
}
