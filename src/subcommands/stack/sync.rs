//! `sync` subcommand.

use crate::{constants::SHORT_HASH_LENGTH, ctx::ReviewContext, sync::sync};
use anyhow::Result;
use clap::Args;
use nu_ansi_term::Color;

/// CLI arguments for the `sync` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct SyncCmd;

impl SyncCmd {
    /// Run the `sync` subcommand.
    pub fn run(self, ctx: ReviewContext<'_>) -> Result<()> {
        ctx.ensure_clean_state()?;

        let report = sync(ctx.repository, &ctx.stack_ref)?;
        let upstream = ctx.stack_ref.upstream_ref();
        if report.up_to_date() {
            println!(
                "`{}` is already up to date with `{}`.",
                Color::Green.paint(&ctx.stack_ref.branch),
                Color::Blue.paint(upstream)
            );
        } else {
            println!(
                "Rebased {} commits of `{}` onto `{}` @ {}.",
                report.entries_after,
                Color::Green.paint(&ctx.stack_ref.branch),
                Color::Blue.paint(upstream),
                Color::DarkGray.paint(&report.new_base[..SHORT_HASH_LENGTH.min(report.new_base.len())])
            );
        }
        if report.entries_after < report.entries_before {
            println!(
                "Dropped {} commits that already landed upstream.",
                report.entries_before - report.entries_after
            );
        }
        Ok(())
    }
}
