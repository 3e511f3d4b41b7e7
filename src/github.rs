//! Wraps octocrab for the one GitHub concern this action has: keeping a
//! single marker-keyed comment on the pull request up to date.
//!
//! A session is cheap to clone and scoped to one repository.

use octocrab::Octocrab;
use octocrab::models::issues::Comment;
use octocrab::params;
use url::Url;

use crate::config::{ApiKey, Config};
use crate::errors::{EvalError, Result};

#[derive(Debug, Clone)]
pub struct GithubSession {
    octocrab: Octocrab,
    owner: String,
    repository: String,
}

impl GithubSession {
    pub fn new(
        token: &ApiKey,
        api_url: Option<&Url>,
        owner: impl Into<String>,
        repository: impl Into<String>,
    ) -> Result<Self> {
        let mut builder = Octocrab::builder().personal_token(token.expose_secret());
        if let Some(api_url) = api_url {
            builder = builder
                .base_uri(api_url.as_str())
                .map_err(|err| EvalError::Config(format!("invalid GitHub API URL: {err}")))?;
        }
        let octocrab = builder
            .build()
            .map_err(|err| EvalError::Config(format!("failed to build GitHub client: {err}")))?;

        Ok(Self {
            octocrab,
            owner: owner.into(),
            repository: repository.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config.github_token.as_ref().ok_or_else(|| {
            EvalError::Config(
                "missing GitHub token; set the `github_token` input or GITHUB_TOKEN".to_string(),
            )
        })?;
        let (owner, repository) = config.owner_and_repo()?;

        Self::new(token, config.github_api_url.as_ref(), owner, repository)
    }

    /// Finds the pull request this run should comment on. An explicit number
    /// wins; otherwise the open pull request whose head is the current
    /// branch.
    #[tracing::instrument(skip(self), err)]
    pub async fn resolve_pr_number(
        &self,
        explicit: Option<u64>,
        branch: Option<&str>,
    ) -> Result<Option<u64>> {
        if let Some(number) = explicit {
            return Ok(Some(number));
        }

        let Some(branch) = branch else {
            return Ok(None);
        };

        let pulls = self
            .octocrab
            .pulls(&self.owner, &self.repository)
            .list()
            .head(format!("{}:{branch}", self.owner))
            .state(params::State::Open)
            .send()
            .await
            .map_err(EvalError::Comment)?;

        Ok(pulls.items.first().map(|pull| pull.number))
    }

    /// Creates or updates the marker-keyed comment, so the pull request
    /// carries exactly one evaluation comment however often the workflow
    /// reruns.
    #[tracing::instrument(skip(self, body), err)]
    pub async fn upsert_comment(
        &self,
        pr_number: u64,
        marker: &str,
        body: &str,
    ) -> Result<Comment> {
        let issues = self.octocrab.issues(&self.owner, &self.repository);

        let existing = issues
            .list_comments(pr_number)
            .per_page(100)
            .send()
            .await
            .map_err(EvalError::Comment)?
            .items
            .into_iter()
            .find(|comment| {
                comment
                    .body
                    .as_deref()
                    .is_some_and(|body| body.contains(marker))
            });

        if let Some(existing) = existing {
            tracing::debug!(comment_id = ?existing.id, "updating existing comment");
            issues
                .update_comment(existing.id, body)
                .await
                .map_err(EvalError::Comment)
        } else {
            tracing::debug!("no marker comment yet, creating one");
            issues
                .create_comment(pr_number, body)
                .await
                .map_err(EvalError::Comment)
        }
    }
}
