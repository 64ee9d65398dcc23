//! The sync engine: moves the stack onto the latest upstream.

use crate::{
    errors::{ReviewError, ReviewResult},
    git::VersionControl,
    stack::{Stack, StackRef},
};
use tracing::{info, warn};

/// The result of a sync.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SyncReport {
    /// The base of the stack before syncing.
    pub previous_base: String,
    /// The base of the stack after syncing, always the upstream tip.
    pub new_base: String,
    /// The number of stack entries before syncing.
    pub entries_before: usize,
    /// The number of stack entries after syncing. Commits that already landed upstream are
    /// dropped.
    pub entries_after: usize,
}

impl SyncReport {
    /// Returns `true` if the stack was already on top of upstream.
    pub fn up_to_date(&self) -> bool {
        self.previous_base == self.new_base
    }
}

/// Fetches upstream and rebases the working branch onto it. Review annotations live in the commit
/// messages, so they survive the rebase.
///
/// ## Returns
/// - `Ok(SyncReport)` - The stack now sits on top of upstream.
/// - `Err(ReviewError::RebaseConflict)` - If a rebase is already in progress, or a commit does not
///   apply cleanly. The rebase is left for the operator to resolve.
/// - `Err(ReviewError::HistoryInconsistency)` - If the stack could not be derived before the
///   rebase, or if the rebased stack is off upstream or out of order. In the latter cases the
///   working branch has already been rebased; its previous tip is in the reflog.
pub fn sync<V: VersionControl>(vcs: &V, stack_ref: &StackRef) -> ReviewResult<SyncReport> {
    if vcs.has_conflicts()? {
        return Err(ReviewError::RebaseConflict(
            "a rebase or merge is already in progress; finish it first".to_string(),
        ));
    }

    let before = Stack::extract(vcs, stack_ref)?;
    vcs.fetch_branch(&stack_ref.remote, &stack_ref.upstream)?;
    let upstream = vcs.resolve_commit(&stack_ref.upstream_ref())?;

    if before.base == upstream {
        info!("`{}` is already on top of `{}`.", stack_ref.branch, stack_ref.upstream_ref());
        return Ok(SyncReport {
            previous_base: before.base,
            new_base: upstream,
            entries_before: before.entries.len(),
            entries_after: before.entries.len(),
        });
    }

    info!(
        "Rebasing {} commits of `{}` onto {}",
        before.entries.len(),
        stack_ref.branch,
        upstream
    );
    vcs.rebase_branch(&stack_ref.branch, &upstream)?;

    let after = Stack::extract(vcs, stack_ref)?;
    if after.base != upstream {
        return Err(rebased_but(
            stack_ref,
            &before.tip,
            &format!("it is based on {} instead of {}", after.base, upstream),
        ));
    }
    if !keeps_order(&before, &after) {
        return Err(rebased_but(
            stack_ref,
            &before.tip,
            "its commits are no longer in their original order",
        ));
    }

    let dropped = before.entries.len() - after.entries.len();
    if dropped > 0 {
        warn!("Dropped {} commits that already landed upstream.", dropped);
    }

    Ok(SyncReport {
        previous_base: before.base,
        new_base: after.base,
        entries_before: before.entries.len(),
        entries_after: after.entries.len(),
    })
}

/// An inconsistency found after the working branch was already rebased.
fn rebased_but(stack_ref: &StackRef, previous_tip: &str, problem: &str) -> ReviewError {
    ReviewError::HistoryInconsistency(format!(
        "`{}` was already rebased, but {}; it was at {} before syncing",
        stack_ref.branch, problem, previous_tip
    ))
}

/// Returns `true` if the entries of `after` appear in `before`, in the same order.
fn keeps_order(before: &Stack, after: &Stack) -> bool {
    let mut remaining = before.entries.iter().map(|e| &e.remote_branch);
    after
        .entries
        .iter()
        .all(|entry| remaining.any(|branch| branch == &entry.remote_branch))
}
