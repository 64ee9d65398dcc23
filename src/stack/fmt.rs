//! Formatting for the [Stack] type.

use super::{Stack, StackEntry, StackRef};
use crate::{
    constants::{
        BOTTOM_LEFT_BOX, COLORS, EMPTY_CIRCLE, FILLED_CIRCLE, HORIZONTAL_BOX, LEFT_FORK_BOX,
        SHORT_HASH_LENGTH, VERTICAL_BOX,
    },
    host::{PullRequest, PullRequestState},
};
use itertools::Itertools;
use nu_ansi_term::Color;
use std::{collections::HashMap, fmt::Write};

impl Stack {
    /// Writes the stack to the passed [Write]r: the upstream branch first, then every entry in
    /// stack order with its review branch and pull request.
    ///
    /// ## Takes
    /// - `w` - The writer to write the log to.
    /// - `stack_ref` - The working and upstream branches.
    /// - `pull_requests` - Pull requests known to the host, by number. Entries whose pull request
    ///   is missing here are rendered with the bare number.
    /// - `patches` - Per-commit patches, by commit hash. Empty unless patch mode is on.
    pub fn write_log<W: Write>(
        &self,
        w: &mut W,
        stack_ref: &StackRef,
        pull_requests: &HashMap<u64, PullRequest>,
        patches: &HashMap<String, String>,
    ) -> std::fmt::Result {
        let upstream_icon = self
            .is_empty()
            .then_some(FILLED_CIRCLE)
            .unwrap_or(EMPTY_CIRCLE);
        writeln!(
            w,
            "{} {}",
            COLORS[0].paint(format!("{} {}", upstream_icon, stack_ref.upstream_ref())),
            Color::DarkGray.paint(&self.base[..SHORT_HASH_LENGTH.min(self.base.len())])
        )?;

        let mut entries = self.entries.iter().enumerate().peekable();
        while let Some((depth, entry)) = entries.next() {
            let is_tip = entries.peek().is_none();
            let connection = format!(
                "{}{}",
                is_tip.then_some(BOTTOM_LEFT_BOX).unwrap_or(LEFT_FORK_BOX),
                HORIZONTAL_BOX
            );
            let icon = is_tip.then_some(FILLED_CIRCLE).unwrap_or(EMPTY_CIRCLE);
            let color = COLORS[(depth + 1) % COLORS.len()];

            writeln!(
                w,
                "{}{}",
                color.paint(format!("{}{} {} {}", connection, icon, entry.short_id(), entry.subject())),
                entry_metadata(entry, pull_requests)
            )?;

            if let Some(patch) = patches.get(&entry.commit.id) {
                let prefix = is_tip
                    .then(|| "   ".to_string())
                    .unwrap_or_else(|| format!("{}  ", color.paint(VERTICAL_BOX.to_string())));
                for line in patch.lines() {
                    writeln!(w, "{}{}", prefix, patch_line_color(line).paint(line))?;
                }
            }
        }

        Ok(())
    }
}

/// Renders the review metadata trailing an entry's log-line.
fn entry_metadata(entry: &StackEntry, pull_requests: &HashMap<u64, PullRequest>) -> String {
    let mut parts = Vec::new();

    if entry.annotation.wip {
        parts.push(Color::Yellow.bold().paint("wip").to_string());
    }
    if let Some(ticket) = &entry.annotation.ticket {
        parts.push(format!("ticket {}", Color::Purple.paint(ticket)));
    }
    parts.push(Color::Green.paint(&entry.remote_branch).to_string());

    let pull_request = entry.pull_request.map(|number| match pull_requests.get(&number) {
        Some(pr) => {
            let state = match pr.state {
                PullRequestState::Open => Color::Green.paint(pr.state.to_string()),
                PullRequestState::Closed => Color::Red.paint(pr.state.to_string()),
                PullRequestState::Merged => Color::Purple.paint(pr.state.to_string()),
            };
            let draft = if pr.draft { " (draft)" } else { "" };
            format!("{} {}{}", Color::Cyan.italic().paint(&pr.url), state, draft)
        }
        None => format!("#{}", number),
    });
    parts.extend(pull_request);

    if entry.last_exported.is_none() && !entry.annotation.wip {
        parts.push(Color::DarkGray.paint("not exported").to_string());
    }

    format!(" ({})", parts.iter().join(", "))
}

fn patch_line_color(line: &str) -> Color {
    match line.chars().next() {
        Some('+') => Color::Green,
        Some('-') => Color::Red,
        Some('@') => Color::Cyan,
        _ => Color::Default,
    }
}
