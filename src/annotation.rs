//! Review metadata carried in commit message trailers.
//!
//! Every piece of state `git-review` keeps about a commit lives in the final paragraph of its
//! message, as `Key: value` trailers. Rebases, amends and reorders carry the trailers along with
//! the commit, so the mapping between a commit and its review branch never goes stale.

/// Trailer keys written by `git-review`.
pub mod trailers {
    /// Ticket (issue) identifier.
    pub const TICKET: &str = "Review-Ticket";
    /// Work-in-progress marker.
    pub const WIP: &str = "Review-Wip";
    /// Stable token that keeps the review branch name unique.
    pub const TOKEN: &str = "Review-Token";
    /// Review branch the commit was last exported to.
    pub const BRANCH: &str = "Review-Branch";
    /// Hash last pushed to the review branch.
    pub const EXPORTED: &str = "Review-Exported";
    /// Pull request opened for the review branch.
    pub const PULL_REQUEST: &str = "Review-Pull-Request";

    /// All keys owned by `git-review`.
    pub const ALL: [&str; 6] = [TICKET, WIP, TOKEN, BRANCH, EXPORTED, PULL_REQUEST];
}

/// Review metadata attached to a single commit.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct Annotation {
    /// The ticket the commit addresses, if any.
    pub ticket: Option<String>,
    /// Whether the commit is excluded from export.
    pub wip: bool,
    /// Token used to derive the review branch name.
    pub token: Option<String>,
    /// The state recorded by the last successful export, if any.
    pub prior_export: Option<PriorExport>,
}

/// The remote identity recorded by the last export of a commit.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PriorExport {
    /// The review branch on the remote.
    pub branch: String,
    /// The hash pushed to `branch`.
    pub hash: String,
    /// The pull request opened for `branch`, if one was created.
    pub pull_request: Option<u64>,
}

/// Parses the [Annotation] from the trailers of a commit message.
///
/// Missing or malformed trailers fall back to their defaults; decoding never fails. A prior export
/// is only recognized when both its branch and hash are present.
pub fn decode(message: &str) -> Annotation {
    let mut annotation = Annotation::default();
    let (mut branch, mut hash, mut pull_request) = (None, None, None);

    for (key, value) in trailer_lines(message).filter_map(split_trailer) {
        let value = value.as_str();
        match key {
            trailers::TICKET => annotation.ticket = Some(value.to_string()),
            trailers::WIP => annotation.wip = matches!(value, "true" | "yes" | "1"),
            trailers::TOKEN => annotation.token = Some(value.to_string()),
            trailers::BRANCH => branch = Some(value.to_string()),
            trailers::EXPORTED => hash = Some(value.to_string()),
            trailers::PULL_REQUEST => pull_request = value.trim_start_matches('#').parse().ok(),
            _ => {}
        }
    }

    if let (Some(branch), Some(hash)) = (branch, hash) {
        annotation.prior_export = Some(PriorExport {
            branch,
            hash,
            pull_request,
        });
    }

    annotation
}

/// Renders the canonical trailer block for an [Annotation]. The default annotation renders as an
/// empty string.
pub fn encode(annotation: &Annotation) -> String {
    let mut lines = Vec::new();

    if let Some(ticket) = &annotation.ticket {
        lines.push(format!("{}: {}", trailers::TICKET, ticket));
    }
    if annotation.wip {
        lines.push(format!("{}: true", trailers::WIP));
    }
    if let Some(token) = &annotation.token {
        lines.push(format!("{}: {}", trailers::TOKEN, token));
    }
    if let Some(prior) = &annotation.prior_export {
        lines.push(format!("{}: {}", trailers::BRANCH, prior.branch));
        lines.push(format!("{}: {}", trailers::EXPORTED, prior.hash));
        if let Some(number) = prior.pull_request {
            lines.push(format!("{}: {}", trailers::PULL_REQUEST, number));
        }
    }

    lines.join("\n")
}

/// Replaces the `git-review` trailers of `message` with the canonical block for `annotation`.
pub fn apply(message: &str, annotation: &Annotation) -> String {
    let stripped = strip(message);
    let block = encode(annotation);

    match (stripped.is_empty(), block.is_empty()) {
        (_, true) => format!("{}\n", stripped),
        // An empty subject line keeps the block from being read as the subject.
        (true, false) => format!("\n{}\n", block),
        (false, false) => format!("{}\n\n{}\n", stripped, block),
    }
}

/// The message pushed for review: identical to `message` except that export state and the branch
/// token are dropped, so recording an export never changes what gets pushed.
pub fn review_message(message: &str) -> String {
    let annotation = Annotation {
        token: None,
        prior_export: None,
        ..decode(message)
    };
    apply(message, &annotation)
}

/// Removes all `git-review` trailers from `message`, leaving other trailers in place.
pub fn strip(message: &str) -> String {
    let has_trailers = has_trailer_paragraph(message);
    let mut paragraphs = paragraphs(message);

    if has_trailers {
        if let Some(last) = paragraphs.pop() {
            let kept = last
                .lines()
                .filter(|line| split_trailer(line).is_none())
                .collect::<Vec<_>>();
            if !kept.is_empty() {
                paragraphs.push(kept.join("\n"));
            }
        }
    }

    paragraphs.join("\n\n")
}

/// The first line of `message`.
pub fn subject(message: &str) -> &str {
    message.lines().next().unwrap_or_default().trim()
}

/// Everything after the subject paragraph, without `git-review` trailers.
pub fn body(message: &str) -> String {
    strip(message)
        .split_once("\n\n")
        .map(|(_, body)| body.trim().to_string())
        .unwrap_or_default()
}

/// Splits `message` into trimmed, non-empty paragraphs.
fn paragraphs(message: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = Vec::new();

    for line in message.trim().lines().map(str::trim_end) {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
}

/// Returns `true` if the last paragraph of `message` may hold trailers: either it follows a
/// subject, or the subject line is empty.
fn has_trailer_paragraph(message: &str) -> bool {
    let subjectless = message
        .lines()
        .next()
        .is_some_and(|line| line.trim().is_empty());
    match paragraphs(message).len() {
        0 => false,
        1 => subjectless,
        _ => true,
    }
}

/// The lines of the trailer paragraph. A message consisting of a subject alone has no trailers.
fn trailer_lines(message: &str) -> impl Iterator<Item = String> {
    let paragraphs = paragraphs(message);
    let last = has_trailer_paragraph(message)
        .then(|| paragraphs.last().cloned())
        .flatten()
        .unwrap_or_default();
    last.lines().map(ToOwned::to_owned).collect::<Vec<_>>().into_iter()
}

/// Splits a `git-review` trailer into its key and value. Lines that are not one of our trailers
/// yield [None].
fn split_trailer(line: impl AsRef<str>) -> Option<(&'static str, String)> {
    let (key, value) = line.as_ref().split_once(':')?;
    let key = trailers::ALL.into_iter().find(|k| *k == key.trim())?;
    Some((key, value.trim().to_string()))
}
