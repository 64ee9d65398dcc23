//! `rebase` subcommand.

use crate::{ctx::ReviewContext, git::RepositoryExt};
use anyhow::Result;
use clap::Args;
use nu_ansi_term::Color;

/// CLI arguments for the `rebase` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct RebaseCmd;

impl RebaseCmd {
    /// Run the `rebase` subcommand.
    pub fn run(self, ctx: ReviewContext<'_>) -> Result<()> {
        ctx.ensure_clean_state()?;

        let upstream = ctx.stack_ref.upstream_ref();
        ctx.repository.interactive_rebase(&upstream)?;

        println!(
            "Rebased `{}` onto `{}`. Run `git-review export` to update your pull requests.",
            Color::Green.paint(&ctx.stack_ref.branch),
            Color::Blue.paint(upstream)
        );
        Ok(())
    }
}
