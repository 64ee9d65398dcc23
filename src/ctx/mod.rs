//! The in-memory context of the `git-review` application.

use crate::{
    config::ReviewConfig,
    errors::{ReviewError, ReviewResult},
    git::RepositoryExt,
    host::GitHub,
    stack::StackRef,
};
use git2::Repository;
use std::time::Duration;
use tracing::debug;

/// The in-memory context of the `git-review` application.
pub struct ReviewContext<'a> {
    /// The repository holding the stack.
    pub repository: &'a Repository,
    /// The global configuration.
    pub config: ReviewConfig,
    /// The working branch, upstream and remote of the stack.
    pub stack_ref: StackRef,
}

impl<'a> ReviewContext<'a> {
    /// Loads the configuration for the given [Repository] and assembles a [ReviewContext].
    pub fn load(repository: &'a Repository) -> ReviewResult<Self> {
        let config = ReviewConfig::load()?;
        let stack_ref = StackRef::load(repository)?;
        debug!("Loaded context for {:?}", stack_ref);

        Ok(Self {
            repository,
            config,
            stack_ref,
        })
    }

    /// Checks that the working branch is checked out.
    pub fn ensure_on_working_branch(&self) -> ReviewResult<()> {
        let current = self.repository.current_branch_name()?;
        if current != self.stack_ref.branch {
            return Err(ReviewError::NotOnWorkingBranch {
                expected: self.stack_ref.branch.clone(),
                actual: current,
            });
        }
        Ok(())
    }

    /// Checks that the working branch is checked out and the working tree is clean. Every command
    /// that rewrites history or talks to the remote requires this.
    pub fn ensure_clean_state(&self) -> ReviewResult<()> {
        self.ensure_on_working_branch()?;
        if !self.repository.is_working_tree_clean()? {
            return Err(ReviewError::WorkingTreeDirty);
        }
        Ok(())
    }

    /// Establishes the GitHub client for the repository behind the configured remote.
    pub fn host(&self) -> ReviewResult<GitHub> {
        let (owner, repository) = self
            .repository
            .owner_and_repository(&self.stack_ref.remote)?;
        GitHub::new(
            self.config.token()?,
            self.config.api_url.as_deref(),
            owner,
            repository,
        )
    }

    /// The upper bound for each GitHub API call.
    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }
}
