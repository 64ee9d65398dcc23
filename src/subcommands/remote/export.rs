//! `export` subcommand.

use crate::{
    ctx::ReviewContext,
    export::{export, ExportOptions},
};
use anyhow::{anyhow, Result};
use clap::Args;
use nu_ansi_term::Color;

/// CLI arguments for the `export` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct ExportCmd {
    /// Overwrite review branches that were modified by someone else.
    #[arg(short, long)]
    pub force: bool,
}

impl ExportCmd {
    /// Run the `export` subcommand.
    pub async fn run(self, ctx: ReviewContext<'_>) -> Result<()> {
        ctx.ensure_clean_state()?;

        let host = ctx.host()?;
        let options = ExportOptions {
            force: self.force,
            timeout: ctx.timeout(),
        };
        let report = export(ctx.repository, &host, &ctx.stack_ref, &options).await?;

        if report.entries.is_empty() {
            println!(
                "Nothing to export; `{}` has no commits on top of `{}`.",
                Color::Green.paint(&ctx.stack_ref.branch),
                Color::Blue.paint(ctx.stack_ref.upstream_ref())
            );
            return Ok(());
        }

        cli_table::print_stdout(report.table())?;

        let attention = report
            .entries
            .iter()
            .filter(|entry| entry.outcome.needs_attention())
            .count();
        if attention > 0 {
            return Err(anyhow!(
                "{} of {} commits could not be exported; see above.",
                attention,
                report.entries.len()
            ));
        }
        Ok(())
    }
}
