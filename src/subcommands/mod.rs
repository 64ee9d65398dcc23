//! The subcommands for the `git-review` application.

use crate::ctx::ReviewContext;
use clap::Subcommand;
use local::{ConfigCmd, LogCmd, NewCmd};
use remote::ExportCmd;
use stack::{RebaseCmd, SyncCmd};

mod local;
mod remote;
mod stack;

#[derive(Debug, Clone, Eq, PartialEq, Subcommand)]
pub enum Subcommands {
    /// Fetch upstream and rebase the stack on top of it.
    #[clap(alias = "s")]
    Sync(SyncCmd),
    /// Commit the staged changes on top of the stack, for a ticket. New commits are work in
    /// progress unless `--ready` is passed.
    #[clap(alias = "n")]
    New(NewCmd),
    /// Interactively rebase the stack onto upstream.
    #[clap(alias = "r")]
    Rebase(RebaseCmd),
    /// Push every ready commit to its review branch and open or update its pull request.
    #[clap(aliases = ["e", "submit"])]
    Export(ExportCmd),
    /// Print the stack, its review branches and pull requests.
    #[clap(aliases = ["l", "ls"])]
    Log(LogCmd),
    /// Print the configuration, prompting for a GitHub token if none is set.
    Config(ConfigCmd),
}

impl Subcommands {
    /// Run the subcommand with the given context.
    pub async fn run(self, ctx: ReviewContext<'_>) -> anyhow::Result<()> {
        match self {
            Self::Sync(args) => args.run(ctx),
            Self::New(args) => args.run(ctx).await,
            Self::Rebase(args) => args.run(ctx),
            Self::Export(args) => args.run(ctx).await,
            Self::Log(args) => args.run(ctx).await,
            Self::Config(args) => args.run(ctx),
        }
    }
}
