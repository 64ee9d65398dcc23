//! Observation and classification of the review branches backing a stack.

use crate::{
    annotation::PriorExport,
    errors::ReviewResult,
    host::{with_timeout, Host, PullRequest},
    stack::Stack,
};
use futures::future::join_all;
use std::{collections::HashMap, time::Duration};
use tracing::debug;

/// A review branch as currently seen on the remote.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RemoteBranchState {
    /// The branch name.
    pub branch: String,
    /// The tip of the branch, [None] if it does not exist.
    pub tip: Option<String>,
}

impl RemoteBranchState {
    /// Returns `true` if the branch exists on the remote.
    pub fn exists(&self) -> bool {
        self.tip.is_some()
    }
}

/// How a review branch relates to what `git-review` last pushed to it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RemoteState {
    /// The branch does not exist remotely.
    New,
    /// The branch holds exactly what `git-review` pushed; it is safe to overwrite.
    Clean { tip: String },
    /// Someone else moved the branch; overwriting it would destroy their work.
    ForeignModified { tip: String },
}

/// Queries the tips of `branches` concurrently, each query bounded by `timeout`. Results are
/// returned in the order of `branches`; a failed query only affects its own branch.
pub async fn observe<H: Host>(
    host: &H,
    branches: &[String],
    timeout: Duration,
) -> Vec<ReviewResult<RemoteBranchState>> {
    join_all(branches.iter().map(|branch| async move {
        let tip = with_timeout(
            timeout,
            &format!("querying branch `{}`", branch),
            host.branch_tip(branch),
        )
        .await?;
        debug!("Observed `{}` at {:?}", branch, tip);
        Ok(RemoteBranchState {
            branch: branch.clone(),
            tip,
        })
    }))
    .await
}

/// Classifies an observed review branch.
///
/// ## Takes
/// - `prior` - The export recorded in the commit, if any.
/// - `observed` - The branch as seen on the remote.
/// - `review_hash` - The commit this run would push.
///
/// A tip equal to the recorded export, or to the commit about to be pushed, was produced by
/// `git-review`. Any other tip is foreign, including a branch that exists without a recorded
/// export.
pub fn classify(
    prior: Option<&PriorExport>,
    observed: &RemoteBranchState,
    review_hash: &str,
) -> RemoteState {
    match &observed.tip {
        None => RemoteState::New,
        Some(tip) if prior.is_some_and(|p| &p.hash == tip) || tip == review_hash => {
            RemoteState::Clean { tip: tip.clone() }
        }
        Some(tip) => RemoteState::ForeignModified { tip: tip.clone() },
    }
}

/// Fetches the pull requests recorded in `stack` concurrently. Pull requests that cannot be
/// fetched are left out.
pub async fn pull_requests<H: Host>(
    host: &H,
    stack: &Stack,
    timeout: Duration,
) -> HashMap<u64, PullRequest> {
    let numbers = stack
        .entries
        .iter()
        .filter_map(|entry| entry.pull_request)
        .collect::<Vec<_>>();

    join_all(numbers.into_iter().map(|number| async move {
        with_timeout(
            timeout,
            &format!("fetching pull request #{}", number),
            host.get_pull_request(number),
        )
        .await
        .inspect_err(|e| debug!("Pull request #{} unavailable: {}", number, e))
        .ok()
    }))
    .await
    .into_iter()
    .flatten()
    .map(|pr| (pr.number, pr))
    .collect()
}

#[cfg(test)]
mod test {
    use super::{classify, observe, pull_requests, RemoteBranchState, RemoteState};
    use crate::{
        annotation::{self, Annotation, PriorExport},
        errors::ReviewError,
        stack::{Stack, StackRef},
        testing::{FakeRemote, FakeRepo},
    };
    use std::{sync::Arc, time::Duration};

    fn observed(tip: Option<&str>) -> RemoteBranchState {
        RemoteBranchState {
            branch: "a".to_string(),
            tip: tip.map(ToOwned::to_owned),
        }
    }

    fn prior(hash: &str) -> PriorExport {
        PriorExport {
            branch: "a".to_string(),
            hash: hash.to_string(),
            pull_request: None,
        }
    }

    #[test]
    fn absent_branch_is_new() {
        assert_eq!(classify(Some(&prior("h1")), &observed(None), "h2"), RemoteState::New);
        assert_eq!(classify(None, &observed(None), "h2"), RemoteState::New);
    }

    #[test]
    fn recorded_tip_is_clean() {
        assert_eq!(
            classify(Some(&prior("h1")), &observed(Some("h1")), "h2"),
            RemoteState::Clean { tip: "h1".to_string() }
        );
    }

    #[test]
    fn review_commit_tip_is_clean() {
        // A previous run pushed but never recorded the export.
        assert_eq!(
            classify(None, &observed(Some("h2")), "h2"),
            RemoteState::Clean { tip: "h2".to_string() }
        );
        assert_eq!(
            classify(Some(&prior("h1")), &observed(Some("h2")), "h2"),
            RemoteState::Clean { tip: "h2".to_string() }
        );
    }

    #[test]
    fn other_tips_are_foreign() {
        assert_eq!(
            classify(Some(&prior("h1")), &observed(Some("hf")), "h2"),
            RemoteState::ForeignModified { tip: "hf".to_string() }
        );
        assert_eq!(
            classify(None, &observed(Some("hf")), "h2"),
            RemoteState::ForeignModified { tip: "hf".to_string() }
        );
    }

    #[tokio::test]
    async fn observe_isolates_failures() {
        let remote = FakeRemote::default();
        remote.set_tip("a", "h1");
        remote.set_unreachable("b");
        remote.set_slow("c");

        let branches = ["a", "b", "c", "d"].map(String::from).to_vec();
        let results = observe(&remote, &branches, Duration::from_millis(50)).await;

        assert_eq!(results[0].as_ref().unwrap().tip.as_deref(), Some("h1"));
        assert!(matches!(results[1], Err(ReviewError::NetworkFailure(_))));
        assert!(
            matches!(&results[2], Err(ReviewError::NetworkFailure(m)) if m.contains("timed out"))
        );
        assert!(!results[3].as_ref().unwrap().exists());
    }

    #[tokio::test]
    async fn pull_requests_skip_unavailable_numbers() {
        let remote = Arc::new(FakeRemote::default());
        let repo = FakeRepo::new(remote.clone());
        let number = remote.add_pull("a", "main");

        for (branch, pr, tree) in [("a", number, "t1"), ("b", 99, "t2")] {
            let annotation = Annotation {
                prior_export: Some(PriorExport {
                    branch: branch.to_string(),
                    hash: "h".to_string(),
                    pull_request: Some(pr),
                }),
                ..Default::default()
            };
            repo.commit("work", tree, &annotation::apply(branch, &annotation));
        }
        let stack = Stack::extract(&repo, &StackRef::new("work", "main", "origin")).unwrap();

        let found = pull_requests(remote.as_ref(), &stack, Duration::from_secs(1)).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[&number].head, "a");
    }
}
