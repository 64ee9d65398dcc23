//! The export engine: pushes review branches and keeps the chain of pull requests in step with the
//! stack.

use crate::{
    annotation::{Annotation, PriorExport},
    errors::{ReviewError, ReviewResult},
    git::VersionControl,
    host::{with_timeout, Host, NewPullRequest, PullRequest, PullRequestState},
    remote::{self, RemoteBranchState, RemoteState},
    stack::{Stack, StackEntry, StackRef},
};
use cli_table::{format::Justify, Cell, Style, Table};
use nu_ansi_term::Color;
use std::{collections::HashMap, fmt::Display, time::Duration};
use tracing::{info, warn};

/// Options for a single export run.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExportOptions {
    /// Overwrite review branches that were modified by someone else.
    pub force: bool,
    /// Upper bound for every hosting-service call.
    pub timeout: Duration,
}

/// What an export run did with one stack entry.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ExportOutcome {
    /// A pull request was opened.
    Created { pull_request: u64 },
    /// The review branch or the pull request base was updated.
    Updated,
    /// The entry is marked work-in-progress.
    SkippedWip,
    /// The review branch was changed by someone else and left alone.
    SkippedForeignModified { tip: String },
    /// Remote state already matched the entry.
    Unchanged,
    /// The hosting service could not be reached for this entry.
    Failed { reason: String },
}

impl ExportOutcome {
    /// Returns `true` if an operator has to look at the entry.
    pub fn needs_attention(&self) -> bool {
        matches!(
            self,
            Self::SkippedForeignModified { .. } | Self::Failed { .. }
        )
    }

    fn color(&self) -> Color {
        match self {
            Self::Created { .. } | Self::Updated => Color::Green,
            Self::SkippedWip | Self::Unchanged => Color::DarkGray,
            Self::SkippedForeignModified { .. } => Color::Yellow,
            Self::Failed { .. } => Color::Red,
        }
    }
}

impl Display for ExportOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created { .. } => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::SkippedWip => write!(f, "skipped-wip"),
            Self::SkippedForeignModified { .. } => write!(f, "skipped-foreign-modified"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Failed { .. } => write!(f, "failed"),
        }
    }
}

/// The outcome for one entry of the stack.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EntryReport {
    /// The commit hash at the time of the export.
    pub commit: String,
    /// The commit subject.
    pub subject: String,
    /// The review branch of the entry.
    pub branch: String,
    /// What happened.
    pub outcome: ExportOutcome,
}

/// The result of an export run, in stack order.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ExportReport {
    /// One report per stack entry, oldest first.
    pub entries: Vec<EntryReport>,
    /// The new tip of the working branch, if export state was recorded.
    pub new_tip: Option<String>,
}

impl ExportReport {
    /// The outcomes, in stack order.
    pub fn outcomes(&self) -> Vec<&ExportOutcome> {
        self.entries.iter().map(|e| &e.outcome).collect()
    }

    /// Returns `true` if any entry needs an operator's attention.
    pub fn needs_attention(&self) -> bool {
        self.entries.iter().any(|e| e.outcome.needs_attention())
    }

    /// Renders the report as a table, newest entry first.
    pub fn table(&self) -> cli_table::TableStruct {
        self.entries
            .iter()
            .rev()
            .map(|entry| {
                let detail = match &entry.outcome {
                    ExportOutcome::Created { pull_request } => format!("#{}", pull_request),
                    ExportOutcome::SkippedForeignModified { tip } => format!("remote at {}", tip),
                    ExportOutcome::Failed { reason } => reason.clone(),
                    _ => String::new(),
                };
                vec![
                    entry.commit.chars().take(7).collect::<String>().cell(),
                    entry.branch.as_str().cell(),
                    entry
                        .outcome
                        .color()
                        .paint(entry.outcome.to_string())
                        .to_string()
                        .cell()
                        .justify(Justify::Left),
                    detail.cell(),
                    entry.subject.as_str().cell(),
                ]
            })
            .table()
            .title(vec![
                "commit".cell().bold(true),
                "branch".cell().bold(true),
                "result".cell().bold(true),
                "detail".cell().bold(true),
                "subject".cell().bold(true),
            ])
    }
}

/// Exports every non-wip entry of the stack named by `stack_ref`.
///
/// Branch tips are queried concurrently up front. Entries are then processed one at a time, oldest
/// first: each is pushed unless someone else modified its review branch, and its pull request is
/// opened or rebased onto the review branch of the entry below it. The export state of every
/// entry is recorded in its commit once all entries are processed.
///
/// ## Returns
/// - `Ok(ExportReport)` - Per-entry outcomes. Entry-scoped failures are reported, not returned.
/// - `Err(_)` - If the stack could not be derived, or the export state could not be recorded.
pub async fn export<V: VersionControl, H: Host>(
    vcs: &V,
    host: &H,
    stack_ref: &StackRef,
    options: &ExportOptions,
) -> ReviewResult<ExportReport> {
    let stack = Stack::extract(vcs, stack_ref)?;
    if stack.is_empty() {
        info!("Nothing to export: `{}` has no commits on top of upstream.", stack_ref.branch);
        return Ok(ExportReport::default());
    }
    let review_commits = stack.review_commits(vcs)?;

    let branches = stack
        .entries
        .iter()
        .filter(|entry| !entry.annotation.wip)
        .map(|entry| entry.remote_branch.clone())
        .collect::<Vec<_>>();
    let mut observed = branches
        .iter()
        .cloned()
        .zip(remote::observe(host, &branches, options.timeout).await)
        .collect::<HashMap<_, _>>();

    let mut exporter = Exporter {
        vcs,
        host,
        stack_ref,
        options,
        base: stack_ref.upstream.clone(),
        updates: HashMap::new(),
    };

    let mut entries = Vec::with_capacity(stack.entries.len());
    for (entry, review_commit) in stack.entries.iter().zip(&review_commits) {
        let outcome = if entry.annotation.wip {
            info!("Skipping `{}`: work in progress.", entry.subject());
            ExportOutcome::SkippedWip
        } else {
            let observation = observed.remove(&entry.remote_branch).unwrap_or_else(|| {
                Err(ReviewError::NetworkFailure(format!(
                    "branch `{}` was not observed",
                    entry.remote_branch
                )))
            });
            exporter
                .export_entry(entry, review_commit, observation)
                .await?
        };

        entries.push(EntryReport {
            commit: entry.commit.id.clone(),
            subject: entry.subject().to_string(),
            branch: entry.remote_branch.clone(),
            outcome,
        });
    }

    let new_tip = stack.rewrite_annotations(vcs, stack_ref, &exporter.updates)?;
    Ok(ExportReport { entries, new_tip })
}

/// Per-run state of the sequential phase of an export.
struct Exporter<'a, V, H> {
    vcs: &'a V,
    host: &'a H,
    stack_ref: &'a StackRef,
    options: &'a ExportOptions,
    /// The base for the next pull request: the last review branch that exists remotely, or
    /// upstream.
    base: String,
    /// New annotations to record, by commit hash.
    updates: HashMap<String, Annotation>,
}

/// What happened to an entry's pull request.
enum PullRequestChange {
    Created(PullRequest),
    Rebased(PullRequest),
    Untouched(PullRequest),
}

impl<'a, V: VersionControl, H: Host> Exporter<'a, V, H> {
    /// Exports a single non-wip entry. Entry-scoped failures become the entry's outcome; anything
    /// else aborts the run.
    async fn export_entry(
        &mut self,
        entry: &StackEntry,
        review_commit: &str,
        observation: ReviewResult<RemoteBranchState>,
    ) -> ReviewResult<ExportOutcome> {
        let observed = match observation {
            Ok(observed) => observed,
            Err(e) if e.is_entry_scoped() => {
                warn!("Skipping `{}`: {}", entry.remote_branch, e);
                // A branch exported before is assumed to still exist.
                if entry.annotation.prior_export.is_some() {
                    self.base = entry.remote_branch.clone();
                }
                return Ok(ExportOutcome::Failed {
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let state = remote::classify(
            entry.annotation.prior_export.as_ref(),
            &observed,
            review_commit,
        );
        if let RemoteState::ForeignModified { tip } = &state {
            let divergence = ReviewError::ForeignDivergence {
                branch: entry.remote_branch.clone(),
                tip: tip.clone(),
            };
            if !self.options.force {
                warn!("{}", divergence);
                // The branch still exists, so the entries above chain onto it.
                self.base = entry.remote_branch.clone();
                return Ok(ExportOutcome::SkippedForeignModified { tip: tip.clone() });
            }
            warn!("{} Overwriting it as requested.", divergence);
        }

        // Pushing the review branch is the commit point for this entry.
        let pushed = observed.tip.as_deref() != Some(review_commit);
        if pushed {
            // The push only succeeds if the branch is still where it was observed.
            let push = self.vcs.force_push(
                &self.stack_ref.remote,
                review_commit,
                &entry.remote_branch,
                observed.tip.as_deref(),
            );
            match push {
                Ok(()) => info!("Pushed {} to `{}`.", review_commit, entry.remote_branch),
                Err(ReviewError::ForeignDivergence { branch, tip }) => {
                    warn!("`{}` moved to {} during the export; leaving it alone.", branch, tip);
                    self.base = branch;
                    return Ok(ExportOutcome::SkippedForeignModified { tip });
                }
                Err(e) if e.is_entry_scoped() => {
                    warn!("Failed to push `{}`: {}", entry.remote_branch, e);
                    if observed.exists() {
                        self.base = entry.remote_branch.clone();
                    }
                    return Ok(ExportOutcome::Failed {
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let base = std::mem::replace(&mut self.base, entry.remote_branch.clone());
        let mut prior = PriorExport {
            branch: entry.remote_branch.clone(),
            hash: review_commit.to_string(),
            pull_request: entry.pull_request,
        };

        let outcome = match self.reconcile_pull_request(entry, &base).await {
            Ok(PullRequestChange::Created(pr)) => {
                prior.pull_request = Some(pr.number);
                ExportOutcome::Created {
                    pull_request: pr.number,
                }
            }
            Ok(PullRequestChange::Rebased(pr)) => {
                prior.pull_request = Some(pr.number);
                ExportOutcome::Updated
            }
            Ok(PullRequestChange::Untouched(pr)) => {
                prior.pull_request = Some(pr.number);
                if pushed {
                    ExportOutcome::Updated
                } else {
                    ExportOutcome::Unchanged
                }
            }
            Err(e) if !e.is_entry_scoped() => return Err(e),
            Err(e) => {
                // The push is recorded regardless; the next run retries the pull request.
                warn!(
                    "Pushed `{}` but could not update its pull request: {}",
                    entry.remote_branch, e
                );
                ExportOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        // Recording the token pins the branch name of a first export.
        let token = match &entry.annotation.prior_export {
            None => Some(entry.token.clone()),
            Some(_) => entry.annotation.token.clone(),
        };
        let annotation = Annotation {
            token,
            prior_export: Some(prior),
            ..entry.annotation.clone()
        };
        if annotation != entry.annotation {
            self.updates.insert(entry.commit.id.clone(), annotation);
        }

        Ok(outcome)
    }

    /// Opens the entry's pull request, or points the existing one at `base`.
    async fn reconcile_pull_request(
        &self,
        entry: &StackEntry,
        base: &str,
    ) -> ReviewResult<PullRequestChange> {
        let timeout = self.options.timeout;
        let existing = match entry.pull_request {
            Some(number) => Some(
                with_timeout(
                    timeout,
                    &format!("fetching pull request #{}", number),
                    self.host.get_pull_request(number),
                )
                .await?,
            ),
            None => {
                with_timeout(
                    timeout,
                    &format!("looking up the pull request for `{}`", entry.remote_branch),
                    self.host.find_pull_request(&entry.remote_branch),
                )
                .await?
            }
        };

        match existing {
            None => {
                let request = NewPullRequest {
                    title: entry.title(),
                    body: entry.body(),
                    head: entry.remote_branch.clone(),
                    base: base.to_string(),
                };
                let pr = with_timeout(
                    timeout,
                    &format!("opening a pull request for `{}`", entry.remote_branch),
                    self.host.create_pull_request(&request),
                )
                .await?;
                info!("Opened pull request #{} (`{}` -> `{}`).", pr.number, pr.head, pr.base);
                Ok(PullRequestChange::Created(pr))
            }
            Some(pr) if pr.state != PullRequestState::Open => {
                warn!(
                    "Pull request #{} for `{}` is {}; leaving it as is.",
                    pr.number, entry.remote_branch, pr.state
                );
                Ok(PullRequestChange::Untouched(pr))
            }
            Some(pr) if pr.base == base => Ok(PullRequestChange::Untouched(pr)),
            Some(pr) => {
                let pr = with_timeout(
                    timeout,
                    &format!("rebasing pull request #{}", pr.number),
                    self.host.update_pull_request_base(pr.number, base),
                )
                .await?;
                info!("Pull request #{} now targets `{}`.", pr.number, pr.base);
                Ok(PullRequestChange::Rebased(pr))
            }
        }
    }
}
