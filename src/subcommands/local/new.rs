//! `new` subcommand.

use crate::{
    annotation::{self, Annotation},
    constants::BRANCH_TOKEN_LENGTH,
    ctx::ReviewContext,
    git::RepositoryExt,
    host::{with_timeout, Host},
};
use anyhow::Result;
use clap::Args;
use nu_ansi_term::Color;
use std::time::Duration;
use tracing::warn;

/// CLI arguments for the `new` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct NewCmd {
    /// The ticket the commit belongs to, e.g. `PROJ-1` or a GitHub issue number.
    pub ticket: String,
    /// The commit message. Defaults to the title of the GitHub issue for numeric tickets, and is
    /// prompted for otherwise.
    pub message: Option<String>,
    /// Mark the commit ready for review instead of work in progress.
    #[arg(long)]
    pub ready: bool,
}

impl NewCmd {
    /// Run the `new` subcommand.
    pub async fn run(self, ctx: ReviewContext<'_>) -> Result<()> {
        ctx.ensure_on_working_branch()?;

        let fetched = match (&self.message, issue_number(&self.ticket)) {
            (None, Some(number)) => match ctx.host() {
                Ok(host) => issue_title(&host, number, ctx.timeout()).await,
                Err(e) => {
                    warn!("Cannot reach GitHub for issue #{}: {}", number, e);
                    None
                }
            },
            _ => None,
        };
        let message = match self.message.clone().or(fetched) {
            Some(message) => message,
            None => inquire::Text::new(
                format!("Commit message for {}:", Color::Purple.paint(&self.ticket)).as_str(),
            )
            .prompt()?,
        };

        let mut token = uuid::Uuid::new_v4().simple().to_string();
        token.truncate(BRANCH_TOKEN_LENGTH);
        let annotation = Annotation {
            ticket: Some(self.ticket.clone()),
            wip: !self.ready,
            token: Some(token),
            prior_export: None,
        };

        let subject = format!("{}: {}", self.ticket, message.trim());
        let oid = ctx
            .repository
            .commit_staged(&annotation::apply(&subject, &annotation))?;

        println!(
            "Committed {} `{}`{}",
            Color::Blue.paint(oid.to_string()),
            subject,
            if self.ready {
                String::new()
            } else {
                format!(" as {}", Color::Yellow.paint("work in progress"))
            }
        );
        Ok(())
    }
}

/// The GitHub issue number of a ticket such as `12` or `#12`.
fn issue_number(ticket: &str) -> Option<u64> {
    ticket.trim().trim_start_matches('#').parse().ok()
}

/// Fetches the title of issue `number`, or [None] if it cannot be fetched in time.
async fn issue_title<H: Host>(host: &H, number: u64, timeout: Duration) -> Option<String> {
    let call = host.issue_title(number);
    match with_timeout(timeout, &format!("fetching issue #{}", number), call).await {
        Ok(title) if !title.trim().is_empty() => Some(title.trim().to_string()),
        Ok(_) => None,
        Err(e) => {
            warn!("Could not fetch the title of issue #{}: {}", number, e);
            None
        }
    }
}
