//! The stack: the ordered commits between upstream and the tip of the working branch.

use crate::{
    annotation::{self, Annotation},
    constants::{BRANCH_TOKEN_LENGTH, SHORT_HASH_LENGTH},
    errors::{ReviewError, ReviewResult},
    git::{CommitInfo, VersionControl},
};
use itertools::Itertools;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

mod fmt;

/// Identifies the working branch and the upstream branch it is stacked on. Every stack operation
/// takes one explicitly.
///
/// No two `git-review` invocations may run against the same checkout at once; both the working
/// tree and the review branches are mutated in place.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StackRef {
    /// The local branch holding the stack.
    pub branch: String,
    /// The upstream branch name on the remote, e.g. `main`.
    pub upstream: String,
    /// The remote name, e.g. `origin`.
    pub remote: String,
}

impl StackRef {
    /// Creates a new [StackRef].
    pub fn new(
        branch: impl Into<String>,
        upstream: impl Into<String>,
        remote: impl Into<String>,
    ) -> Self {
        Self {
            branch: branch.into(),
            upstream: upstream.into(),
            remote: remote.into(),
        }
    }

    /// The remote-tracking reference of the upstream branch, e.g. `origin/main`.
    pub fn upstream_ref(&self) -> String {
        format!("{}/{}", self.remote, self.upstream)
    }
}

/// A commit of the stack, paired with its review metadata.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StackEntry {
    /// The commit.
    pub commit: CommitInfo,
    /// The decoded trailers of the commit.
    pub annotation: Annotation,
    /// The branch token: the `Review-Token` trailer, or one derived from the commit.
    pub token: String,
    /// The review branch this commit is exported to.
    pub remote_branch: String,
    /// The pull request recorded for this commit.
    pub pull_request: Option<u64>,
    /// The hash last pushed to `remote_branch`.
    pub last_exported: Option<String>,
}

impl StackEntry {
    /// Creates a [StackEntry] from a commit, deriving its review branch name.
    pub fn from_commit(commit: CommitInfo) -> Self {
        let annotation = annotation::decode(&commit.message);
        let token = annotation
            .token
            .clone()
            .unwrap_or_else(|| derived_token(&commit, annotation.ticket.as_deref(), 0));
        let remote_branch = review_branch_name(&annotation, &token);
        let (pull_request, last_exported) = annotation
            .prior_export
            .as_ref()
            .map_or((None, None), |prior| {
                (prior.pull_request, Some(prior.hash.clone()))
            });

        Self {
            commit,
            annotation,
            token,
            remote_branch,
            pull_request,
            last_exported,
        }
    }

    /// Returns `true` if the review branch comes from neither a trailer nor a prior export.
    fn has_derived_branch(&self) -> bool {
        self.annotation.token.is_none() && self.annotation.prior_export.is_none()
    }

    /// The abbreviated commit hash.
    pub fn short_id(&self) -> &str {
        &self.commit.id[..SHORT_HASH_LENGTH.min(self.commit.id.len())]
    }

    /// The subject line of the commit.
    pub fn subject(&self) -> &str {
        annotation::subject(&self.commit.message)
    }

    /// The pull request title: the subject, prefixed with the ticket unless it already is.
    pub fn title(&self) -> String {
        match &self.annotation.ticket {
            Some(ticket) if !self.subject().starts_with(ticket.as_str()) => {
                format!("{}: {}", ticket, self.subject())
            }
            _ => self.subject().to_string(),
        }
    }

    /// The pull request body: the commit body, closing the ticket when it is a GitHub issue.
    pub fn body(&self) -> String {
        let body = annotation::body(&self.commit.message);
        match self.annotation.ticket.as_deref().map(str::parse::<u64>) {
            Some(Ok(issue)) if body.is_empty() => format!("Closes #{}", issue),
            Some(Ok(issue)) => format!("{}\n\nCloses #{}", body, issue),
            _ => body,
        }
    }
}

/// The ordered stack of commits on the working branch, oldest first.
///
/// A [Stack] is derived from history on every run and never persisted; rebases change every hash
/// in it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Stack {
    /// The merge-base of the working branch and upstream.
    pub base: String,
    /// The tip of the working branch.
    pub tip: String,
    /// The entries, oldest (closest to `base`) first.
    pub entries: Vec<StackEntry>,
}

impl Stack {
    /// Derives the stack of the working branch named by `stack_ref`.
    ///
    /// ## Returns
    /// - `Ok(Stack)` - The stack, possibly empty.
    /// - `Err(ReviewError::HistoryInconsistency)` - If the working branch shares no history with
    ///   upstream, contains merge commits, or two commits map to the same review branch.
    pub fn extract<V: VersionControl>(vcs: &V, stack_ref: &StackRef) -> ReviewResult<Self> {
        let tip = vcs.resolve_commit(&stack_ref.branch)?;
        let upstream = vcs.resolve_commit(&stack_ref.upstream_ref())?;
        let base = vcs.find_merge_base(&tip, &upstream)?.ok_or_else(|| {
            ReviewError::HistoryInconsistency(format!(
                "`{}` and `{}` share no history",
                stack_ref.branch,
                stack_ref.upstream_ref()
            ))
        })?;

        let commits = vcs.commits_between(&base, &tip)?;

        if let Some(merge) = commits.iter().find(|c| c.parents.len() != 1) {
            return Err(ReviewError::HistoryInconsistency(format!(
                "stack must be linear, but `{}` has {} parents",
                merge.id,
                merge.parents.len()
            )));
        }

        // The stack must be a single chain of commits on top of the base.
        let mut expected_parent = base.as_str();
        for commit in &commits {
            if commit.parents[0] != expected_parent {
                return Err(ReviewError::HistoryInconsistency(format!(
                    "commit `{}` does not follow `{}`",
                    commit.id, expected_parent
                )));
            }
            expected_parent = commit.id.as_str();
        }

        let mut entries = commits
            .into_iter()
            .map(StackEntry::from_commit)
            .collect::<Vec<_>>();
        separate_derived_branches(&mut entries);

        if let Some(branch) = entries.iter().map(|e| &e.remote_branch).duplicates().next() {
            return Err(ReviewError::HistoryInconsistency(format!(
                "more than one commit maps to review branch `{}`",
                branch
            )));
        }

        debug!(
            "Extracted a stack of {} commits on top of {}",
            entries.len(),
            base
        );
        Ok(Self { base, tip, entries })
    }

    /// Returns `true` if the working branch has no commits on top of upstream.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the review commit of every entry: the entry's tree on top of the previous entry's
    /// review commit, with export state stripped from the message. The result only changes when
    /// the content of an entry or one below it changes.
    pub fn review_commits<V: VersionControl>(&self, vcs: &V) -> ReviewResult<Vec<String>> {
        let mut parent = self.base.clone();
        self.entries
            .iter()
            .map(|entry| {
                let message = annotation::review_message(&entry.commit.message);
                parent = vcs.replay_commit(&entry.commit.id, &parent, &message)?;
                Ok(parent.clone())
            })
            .collect()
    }

    /// Records new annotations in the commits of the stack, replaying every commit from the first
    /// changed one up to the tip, then moving the working branch.
    ///
    /// ## Takes
    /// - `updates` - The new annotation for each changed commit, keyed by commit hash.
    ///
    /// ## Returns
    /// - `Ok(Some(tip))` - The new tip of the working branch.
    /// - `Ok(None)` - Nothing needed to change.
    pub fn rewrite_annotations<V: VersionControl>(
        &self,
        vcs: &V,
        stack_ref: &StackRef,
        updates: &HashMap<String, Annotation>,
    ) -> ReviewResult<Option<String>> {
        if updates.is_empty() {
            return Ok(None);
        }

        let mut parent = self.base.clone();
        let mut rewriting = false;
        for entry in &self.entries {
            let message = updates
                .get(&entry.commit.id)
                .map(|a| annotation::apply(&entry.commit.message, a));

            if !rewriting && message.is_none() {
                parent = entry.commit.id.clone();
                continue;
            }
            rewriting = true;

            let message = message.unwrap_or_else(|| entry.commit.message.clone());
            parent = vcs.replay_commit(&entry.commit.id, &parent, &message)?;
        }

        vcs.move_branch(&stack_ref.branch, &parent, &self.tip)?;
        info!(
            "Recorded export state for {} commits; `{}` is now at {}",
            updates.len(),
            stack_ref.branch,
            parent
        );
        Ok(Some(parent))
    }
}

/// Derives the review branch of a commit: the branch of its last export, otherwise
/// `<ticket>-<token>`, or `review-<token>` without a ticket.
fn review_branch_name(annotation: &Annotation, token: &str) -> String {
    if let Some(prior) = &annotation.prior_export {
        return prior.branch.clone();
    }

    match &annotation.ticket {
        Some(ticket) => format!("{}-{}", sanitize(ticket), token),
        None => format!("review-{}", token),
    }
}

/// Re-derives the token of every derived branch that is already taken further down the stack.
/// Commits authored in the same second by the same author otherwise share a branch. Branches named
/// by trailers are left alone, so duplicates among them are still reported.
fn separate_derived_branches(entries: &mut [StackEntry]) {
    let mut taken = entries
        .iter()
        .filter(|e| !e.has_derived_branch())
        .map(|e| e.remote_branch.clone())
        .collect::<HashSet<_>>();

    for entry in entries.iter_mut().filter(|e| e.has_derived_branch()) {
        let mut occurrence = 0;
        while taken.contains(&entry.remote_branch) {
            occurrence += 1;
            entry.token =
                derived_token(&entry.commit, entry.annotation.ticket.as_deref(), occurrence);
            entry.remote_branch = review_branch_name(&entry.annotation, &entry.token);
        }
        if occurrence > 0 {
            debug!(
                "Commit {} shares its derived branch; using `{}`",
                entry.short_id(),
                entry.remote_branch
            );
        }
        taken.insert(entry.remote_branch.clone());
    }
}

/// A token for commits created without one. Author identity and time survive rebases and amends,
/// so the token is stable across history rewrites. A non-zero `occurrence` separates commits that
/// share both.
fn derived_token(commit: &CommitInfo, ticket: Option<&str>, occurrence: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(commit.author_email.as_bytes());
    hasher.update(commit.authored_at.to_be_bytes());
    hasher.update(ticket.unwrap_or_default().as_bytes());
    if occurrence > 0 {
        hasher.update(occurrence.to_be_bytes());
    }

    let mut token = hex::encode(hasher.finalize());
    token.truncate(BRANCH_TOKEN_LENGTH);
    token
}

/// Replaces characters that are awkward in branch names with `-`.
fn sanitize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '-',
        })
        .collect()
}
