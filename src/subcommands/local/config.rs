//! `config` subcommand.

use crate::{config::ReviewConfig, ctx::ReviewContext};
use anyhow::Result;
use clap::Args;
use cli_table::{Cell, Style, Table};

/// CLI arguments for the `config` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct ConfigCmd;

impl ConfigCmd {
    /// Run the `config` subcommand.
    pub fn run(self, ctx: ReviewContext<'_>) -> Result<()> {
        let config = ReviewConfig::load_or_initialize()?;
        let token = mask_token(&config.github_token);

        let rows = vec![
            vec![
                "config file".cell(),
                ReviewConfig::path()?.display().to_string().cell(),
            ],
            vec!["github-token".cell(), token.cell()],
            vec![
                "api-url".cell(),
                config
                    .api_url
                    .as_deref()
                    .unwrap_or("https://api.github.com")
                    .cell(),
            ],
            vec!["timeout-secs".cell(), config.timeout_secs.cell()],
            vec!["review.branch".cell(), ctx.stack_ref.branch.as_str().cell()],
            vec!["review.main".cell(), ctx.stack_ref.upstream.as_str().cell()],
            vec!["review.origin".cell(), ctx.stack_ref.remote.as_str().cell()],
        ];

        let table = rows
            .table()
            .title(vec!["setting".cell().bold(true), "value".cell().bold(true)]);
        cli_table::print_stdout(table)?;
        Ok(())
    }
}

/// Hides all but the last four characters of a token.
fn mask_token(token: &str) -> String {
    match token.chars().count() {
        0 => "(not set)".to_string(),
        n if n <= 4 => "****".to_string(),
        _ => {
            let mut tail = token.chars().rev().take(4).collect::<Vec<_>>();
            tail.reverse();
            format!("****{}", tail.into_iter().collect::<String>())
        }
    }
}
