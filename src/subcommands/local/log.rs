//! `log` subcommand.

use crate::{ctx::ReviewContext, git::VersionControl, remote, stack::Stack};
use anyhow::Result;
use clap::Args;
use std::collections::HashMap;
use tracing::warn;

/// CLI arguments for the `log` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct LogCmd {
    /// Show the patch of every commit.
    #[arg(short, long)]
    pub patch: bool,
}

impl LogCmd {
    /// Run the `log` subcommand.
    pub async fn run(self, ctx: ReviewContext<'_>) -> Result<()> {
        let stack = Stack::extract(ctx.repository, &ctx.stack_ref)?;

        // Pull request links are best effort; the log works offline.
        let pull_requests = match ctx.host() {
            Ok(host) => remote::pull_requests(&host, &stack, ctx.timeout()).await,
            Err(e) => {
                warn!("Not showing pull requests: {}", e);
                HashMap::new()
            }
        };

        let patches = if self.patch {
            stack
                .entries
                .iter()
                .map(|entry| {
                    let patch = ctx.repository.commit_patch(&entry.commit.id)?;
                    Ok((entry.commit.id.clone(), patch))
                })
                .collect::<Result<HashMap<_, _>>>()?
        } else {
            HashMap::new()
        };

        let mut buf = String::new();
        stack.write_log(&mut buf, &ctx.stack_ref, &pull_requests, &patches)?;
        print!("{}", buf);
        Ok(())
    }
}
