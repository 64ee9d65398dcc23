//! Utilities for interacting with `git` repositories for the `git-review` application.

use crate::errors::{ReviewError, ReviewResult};
use git2::{
    BranchType, DiffFormat, ErrorCode, Oid, Repository, RepositoryState, Sort, StatusOptions,
};
use std::{
    env,
    process::{Command, Stdio},
};
use tracing::{debug, instrument};

/// Returns the repository for the current working directory, and [None] if
/// the current working directory is not within a git repository or an error
/// occurs.
pub fn active_repository() -> Option<Repository> {
    Repository::discover(env::current_dir().ok()?).ok()
}

/// A commit as seen by the stack extractor.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CommitInfo {
    /// The commit hash.
    pub id: String,
    /// The hashes of the commit's parents.
    pub parents: Vec<String>,
    /// The full commit message.
    pub message: String,
    /// The author's email address.
    pub author_email: String,
    /// The author timestamp, in seconds since the epoch.
    pub authored_at: i64,
}

impl CommitInfo {
    fn from_commit(commit: &git2::Commit<'_>) -> Self {
        Self {
            id: commit.id().to_string(),
            parents: commit.parent_ids().map(|id| id.to_string()).collect(),
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
            author_email: commit.author().email().unwrap_or_default().to_string(),
            authored_at: commit.author().when().seconds(),
        }
    }
}

/// The operations `git-review` consumes from the version-control engine.
///
/// Commits are addressed by their hex hash. Implementations must not move any ref other than the
/// ones named explicitly by an operation.
pub trait VersionControl {
    /// Resolves a reference (branch, remote-tracking branch or hash) to a commit hash.
    fn resolve_commit(&self, reference: &str) -> ReviewResult<String>;

    /// Returns the merge-base of two commits, or [None] if they share no history.
    fn find_merge_base(&self, a: &str, b: &str) -> ReviewResult<Option<String>>;

    /// Lists the commits reachable from `tip` but not from `base`, oldest first.
    ///
    /// Fails with [ReviewError::HistoryInconsistency] if `base` is not an ancestor of `tip`.
    fn commits_between(&self, base: &str, tip: &str) -> ReviewResult<Vec<CommitInfo>>;

    /// Creates a commit with the tree, author and committer of `commit`, but with the given parent
    /// and message. No ref is moved. Replaying the same inputs yields the same hash.
    fn replay_commit(&self, commit: &str, parent: &str, message: &str) -> ReviewResult<String>;

    /// Points `branch` at `new_tip`, provided it still points at `expected`.
    fn move_branch(&self, branch: &str, new_tip: &str, expected: &str) -> ReviewResult<()>;

    /// Fetches `branch` from `remote`, updating its remote-tracking branch.
    fn fetch_branch(&self, remote: &str, branch: &str) -> ReviewResult<()>;

    /// Force-updates `branch` on `remote` to `hash`, provided the branch is still at `expected`.
    /// An `expected` of [None] requires that the branch does not exist yet.
    ///
    /// Fails with [ReviewError::ForeignDivergence] if the branch moved in the meantime.
    fn force_push(
        &self,
        remote: &str,
        hash: &str,
        branch: &str,
        expected: Option<&str>,
    ) -> ReviewResult<()>;

    /// Rebases `branch` onto the commit `onto`, keeping each commit's message.
    ///
    /// Stops with [ReviewError::RebaseConflict] when a commit does not apply cleanly, leaving the
    /// rebase in progress for the operator.
    fn rebase_branch(&self, branch: &str, onto: &str) -> ReviewResult<()>;

    /// Returns `true` if the index has conflicts or a rebase or merge is in progress.
    fn has_conflicts(&self) -> ReviewResult<bool>;

    /// Renders the patch introduced by `commit` relative to its first parent.
    fn commit_patch(&self, commit: &str) -> ReviewResult<String>;
}

impl VersionControl for Repository {
    fn resolve_commit(&self, reference: &str) -> ReviewResult<String> {
        Ok(self.revparse_single(reference)?.peel_to_commit()?.id().to_string())
    }

    fn find_merge_base(&self, a: &str, b: &str) -> ReviewResult<Option<String>> {
        match self.merge_base(Oid::from_str(a)?, Oid::from_str(b)?) {
            Ok(oid) => Ok(Some(oid.to_string())),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn commits_between(&self, base: &str, tip: &str) -> ReviewResult<Vec<CommitInfo>> {
        let (base, tip) = (Oid::from_str(base)?, Oid::from_str(tip)?);
        if base != tip && !self.graph_descendant_of(tip, base)? {
            return Err(ReviewError::HistoryInconsistency(format!(
                "`{}` is not an ancestor of `{}`",
                base, tip
            )));
        }

        let mut revwalk = self.revwalk()?;
        revwalk.push(tip)?;
        revwalk.hide(base)?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;

        revwalk
            .map(|oid| Ok(CommitInfo::from_commit(&self.find_commit(oid?)?)))
            .collect()
    }

    fn replay_commit(&self, commit: &str, parent: &str, message: &str) -> ReviewResult<String> {
        let original = self.find_commit(Oid::from_str(commit)?)?;
        let parent = self.find_commit(Oid::from_str(parent)?)?;
        let tree = original.tree()?;

        let oid = self.commit(
            None,
            &original.author(),
            &original.committer(),
            message,
            &tree,
            &[&parent],
        )?;
        Ok(oid.to_string())
    }

    fn move_branch(&self, branch: &str, new_tip: &str, expected: &str) -> ReviewResult<()> {
        self.reference_matching(
            format!("refs/heads/{}", branch).as_str(),
            Oid::from_str(new_tip)?,
            true,
            Oid::from_str(expected)?,
            "git-review: record export state",
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn fetch_branch(&self, remote: &str, branch: &str) -> ReviewResult<()> {
        run_git(self, &["fetch", remote, branch])
            .map(drop)
            .map_err(ReviewError::NetworkFailure)
    }

    #[instrument(skip(self))]
    fn force_push(
        &self,
        remote: &str,
        hash: &str,
        branch: &str,
        expected: Option<&str>,
    ) -> ReviewResult<()> {
        let remote_ref = format!("refs/heads/{}", branch);
        let refspec = format!("{}:{}", hash, remote_ref);
        let lease = format!(
            "--force-with-lease={}:{}",
            remote_ref,
            expected.unwrap_or_default()
        );

        match run_git(self, &["push", lease.as_str(), remote, refspec.as_str()]) {
            Ok(_) => Ok(()),
            Err(e) if e.contains("stale info") => {
                // The push was refused; look up who moved the branch to for the report.
                let tip = run_git(self, &["ls-remote", remote, remote_ref.as_str()])
                    .ok()
                    .and_then(|out| out.split_whitespace().next().map(ToOwned::to_owned))
                    .unwrap_or_else(|| "unknown".to_string());
                Err(ReviewError::ForeignDivergence {
                    branch: branch.to_string(),
                    tip,
                })
            }
            Err(e) => Err(ReviewError::NetworkFailure(e)),
        }
    }

    fn rebase_branch(&self, branch: &str, onto: &str) -> ReviewResult<()> {
        let branch_ref = self.find_branch(branch, BranchType::Local)?;
        let annotated_branch = self.reference_to_annotated_commit(branch_ref.get())?;
        let annotated_onto = self.find_annotated_commit(Oid::from_str(onto)?)?;
        let committer = self.signature()?;

        // Open a rebase operation, rebasing `branch` on top of `onto`.
        let mut rebase = self.rebase(
            Some(&annotated_branch),
            Some(&annotated_onto),
            None,
            None,
        )?;

        // Apply all rebase operations, halting if there is a conflict.
        while let Some(op) = rebase.next() {
            let op = op?;
            if self.index()?.has_conflicts() {
                return Err(ReviewError::RebaseConflict(op.id().to_string()));
            }

            // Keep the original author and message.
            match rebase.commit(None, &committer, None) {
                Ok(_) => {}
                Err(e) if e.code() == ErrorCode::Applied => {
                    debug!("Commit {} is already upstream, dropping it.", op.id());
                }
                Err(e) => return Err(e.into()),
            }
        }

        rebase.finish(Some(&committer))?;
        Ok(())
    }

    fn has_conflicts(&self) -> ReviewResult<bool> {
        Ok(self.index()?.has_conflicts() || self.state() != RepositoryState::Clean)
    }

    fn commit_patch(&self, commit: &str) -> ReviewResult<String> {
        let commit = self.find_commit(Oid::from_str(commit)?)?;
        let tree = commit.tree()?;
        let parent_tree = match commit.parent_count() {
            0 => None,
            _ => Some(commit.parent(0)?.tree()?),
        };

        let diff = self.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
        let mut patch = String::new();
        diff.print(DiffFormat::Patch, |_, _, line| {
            if matches!(line.origin(), '+' | '-' | ' ') {
                patch.push(line.origin());
            }
            patch.push_str(&String::from_utf8_lossy(line.content()));
            true
        })?;
        Ok(patch)
    }
}

/// Extension trait for the [Repository] type to expose helper functions related to
/// working-branch management.
pub trait RepositoryExt {
    /// Returns the name of the current branch.
    ///
    /// ## Returns
    /// - `Result<String>` - The name of the current branch, or an error if HEAD is detached.
    fn current_branch_name(&self) -> ReviewResult<String>;

    /// Checks if the working tree has no staged or unstaged changes to tracked files.
    fn is_working_tree_clean(&self) -> ReviewResult<bool>;

    /// Commits the staged changes on top of HEAD with the given message. The commit may be empty.
    ///
    /// ## Returns
    /// - `Result<Oid>` - The id of the new commit.
    fn commit_staged(&self, message: &str) -> ReviewResult<Oid>;

    /// Returns the `(owner, repository)` pair of the given remote's URL.
    fn owner_and_repository(&self, remote: &str) -> ReviewResult<(String, String)>;

    /// Runs an interactive rebase of the checked out branch onto `onto`, handing the terminal to
    /// `git`. `git2` does not support interactive rebasing.
    fn interactive_rebase(&self, onto: &str) -> ReviewResult<()>;
}

impl RepositoryExt for Repository {
    fn current_branch_name(&self) -> ReviewResult<String> {
        let head = self.head()?;
        if !head.is_branch() {
            return Err(ReviewError::ConfigNotInitialized(
                "HEAD is detached; set `review.branch` or check out your working branch".into(),
            ));
        }
        Ok(head.shorthand().unwrap_or_default().to_string())
    }

    fn is_working_tree_clean(&self) -> ReviewResult<bool> {
        let statuses = self.statuses(Some(
            StatusOptions::new()
                .include_untracked(false)
                .include_ignored(false),
        ))?;
        Ok(statuses.is_empty())
    }

    fn commit_staged(&self, message: &str) -> ReviewResult<Oid> {
        let head_commit = self.head()?.peel_to_commit()?;

        // Write the index as a tree.
        let tree_id = self.index()?.write_tree()?;
        let tree = self.find_tree(tree_id)?;

        let signature = self.signature()?;
        let oid = self.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &[&head_commit],
        )?;
        Ok(oid)
    }

    fn owner_and_repository(&self, remote: &str) -> ReviewResult<(String, String)> {
        let remote = self.find_remote(remote)?;
        let url = remote.url().unwrap_or_default();
        parse_owner_and_repository(url).ok_or_else(|| {
            ReviewError::ConfigNotInitialized(format!(
                "cannot derive the GitHub repository from remote URL `{}`",
                url
            ))
        })
    }

    fn interactive_rebase(&self, onto: &str) -> ReviewResult<()> {
        let mut command = Command::new("git");
        if let Some(workdir) = self.workdir() {
            command.current_dir(workdir);
        }

        let status = command
            .args(["rebase", "--interactive", "--keep-empty", onto])
            .status()?;

        if !status.success() {
            return Err(ReviewError::RebaseConflict(format!(
                "interactive rebase onto `{}` did not complete",
                onto
            )));
        }
        Ok(())
    }
}

/// Parses the owner and repository name from an ssh (`git@host:owner/repo.git`), scp-less ssh
/// (`ssh://git@host/owner/repo`) or https (`https://host/owner/repo.git`) remote URL.
pub fn parse_owner_and_repository(url: &str) -> Option<(String, String)> {
    let path = url.trim().trim_end_matches('/').trim_end_matches(".git");
    let mut segments = path.rsplit(['/', ':']);

    let repository = segments.next().filter(|s| !s.is_empty())?;
    let owner = segments.next().filter(|s| !s.is_empty())?;
    Some((owner.to_string(), repository.to_string()))
}

/// Runs a non-interactive `git` command in the repository's working directory. Network operations
/// go through the `git` binary so that the user's credential helpers apply.
/// Runs `git` in the working directory of `repository`, returning its standard output.
fn run_git(repository: &Repository, args: &[&str]) -> Result<String, String> {
    let mut command = Command::new("git");
    if let Some(workdir) = repository.workdir() {
        command.current_dir(workdir);
    }

    debug!("Executing git {:?}", args);
    let output = command
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| format!("failed to run git: {}", e))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}
