//! GitHub implementation of the [Host] seam, backed by [Octocrab].

use super::{Host, NewPullRequest, PullRequest, PullRequestState};
use crate::errors::ReviewResult;
use async_trait::async_trait;
use octocrab::{
    models::{pulls, repos::Object, IssueState},
    params::{self, repos::Reference},
    Octocrab,
};
use tracing::{debug, instrument};

/// A GitHub repository reached through the REST API.
pub struct GitHub {
    client: Octocrab,
    owner: String,
    repository: String,
}

impl GitHub {
    /// Creates a client for `owner/repository`, authenticated with a personal access token.
    ///
    /// ## Takes
    /// - `token` - The personal access token.
    /// - `api_url` - The API root for GitHub Enterprise installations. [None] for github.com.
    pub fn new(
        token: &str,
        api_url: Option<&str>,
        owner: String,
        repository: String,
    ) -> ReviewResult<Self> {
        let mut builder = Octocrab::builder().personal_token(token.to_string());
        if let Some(api_url) = api_url {
            builder = builder.base_uri(api_url)?;
        }

        Ok(Self {
            client: builder.build()?,
            owner,
            repository,
        })
    }

    fn pulls(&self) -> octocrab::pulls::PullRequestHandler<'_> {
        self.client.pulls(&self.owner, &self.repository)
    }

    fn convert(&self, pr: pulls::PullRequest) -> PullRequest {
        let state = if pr.merged_at.is_some() {
            PullRequestState::Merged
        } else if matches!(pr.state, Some(IssueState::Closed)) {
            PullRequestState::Closed
        } else {
            PullRequestState::Open
        };

        PullRequest {
            number: pr.number,
            base: pr.base.ref_field.clone(),
            head: pr.head.ref_field.clone(),
            title: pr.title.clone().unwrap_or_default(),
            state,
            draft: pr.draft.unwrap_or_default(),
            url: pr
                .html_url
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| self.pull_request_url(pr.number)),
        }
    }
}

/// Returns `true` if GitHub answered 404.
fn is_not_found(error: &octocrab::Error) -> bool {
    matches!(error, octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 404)
}

#[async_trait]
impl Host for GitHub {
    #[instrument(skip(self))]
    async fn branch_tip(&self, branch: &str) -> ReviewResult<Option<String>> {
        let reference = Reference::Branch(branch.to_string());
        match self
            .client
            .repos(&self.owner, &self.repository)
            .get_ref(&reference)
            .await
        {
            Ok(found) => {
                let sha = match found.object {
                    Object::Commit { sha, .. } => sha,
                    Object::Tag { sha, .. } => sha,
                    #[allow(unreachable_patterns)]
                    _ => return Ok(None),
                };
                debug!("Remote branch `{}` is at {}", branch, sha);
                Ok(Some(sha))
            }
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, request), fields(head = %request.head, base = %request.base))]
    async fn create_pull_request(&self, request: &NewPullRequest) -> ReviewResult<PullRequest> {
        let pr = self
            .pulls()
            .create(&request.title, &request.head, &request.base)
            .body(&request.body)
            .draft(false)
            .send()
            .await?;
        Ok(self.convert(pr))
    }

    #[instrument(skip(self))]
    async fn update_pull_request_base(
        &self,
        number: u64,
        base: &str,
    ) -> ReviewResult<PullRequest> {
        let pr = self.pulls().update(number).base(base).send().await?;
        Ok(self.convert(pr))
    }

    async fn get_pull_request(&self, number: u64) -> ReviewResult<PullRequest> {
        let pr = self.pulls().get(number).await?;
        Ok(self.convert(pr))
    }

    async fn find_pull_request(&self, head: &str) -> ReviewResult<Option<PullRequest>> {
        let page = self
            .pulls()
            .list()
            .state(params::State::Open)
            .head(format!("{}:{}", self.owner, head))
            .send()
            .await?;
        Ok(page.items.into_iter().next().map(|pr| self.convert(pr)))
    }

    #[instrument(skip(self))]
    async fn issue_title(&self, number: u64) -> ReviewResult<String> {
        let issue = self
            .client
            .issues(&self.owner, &self.repository)
            .get(number)
            .await?;
        Ok(issue.title)
    }

    fn pull_request_url(&self, number: u64) -> String {
        format!(
            "https://github.com/{}/{}/pull/{}",
            self.owner, self.repository, number
        )
    }
}
