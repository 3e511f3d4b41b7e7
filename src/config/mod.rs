//! Configuration the way the Actions runner provides it.
//!
//! The runner passes every workflow input as an `INPUT_<NAME>` environment
//! variable and the run context as `GITHUB_*` variables. An optional TOML
//! file with the same keys covers local runs. Precedence, lowest first:
//! ambient `GITHUB_*` variables, the file, explicit `INPUT_*` values.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use config::{Config as ConfigRs, Environment, File, FileFormat};
use serde::Deserialize;
use url::Url;

use crate::errors::{EvalError, Result};
use crate::evaluation::PollPolicy;

mod api_key;
mod defaults;

pub use api_key::ApiKey;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Display name for the batch.
    pub test_name: String,
    /// Endpoint of the conversational agent under evaluation.
    pub vla_endpoint: String,
    /// Credentials the evaluation backend uses to talk to the agent.
    pub vla_credentials: ApiKey,
    pub model_id: String,
    pub model_name: String,
    pub scenario_id: String,
    pub user_id: String,
    pub project_id: String,
    /// Conversation attempts per scenario, forwarded to the backend.
    #[serde(default = "defaults::attempts")]
    pub attempts: u32,
    /// Use case selector, e.g. `multiAgent` or `extractor`.
    #[serde(rename = "type")]
    pub eval_type: String,

    /// Job-ingestion endpoint the batch is POSTed to.
    pub ingest_url: Url,
    /// Base URL of the results API.
    pub results_base_url: Url,

    // The GitHub side is ambient in a workflow run.
    pub github_token: Option<ApiKey>,
    pub github_repository: Option<String>,
    pub github_ref: Option<String>,
    pub github_sha: Option<String>,
    pub github_api_url: Option<Url>,
    /// Explicit pull request override; resolved from the ref otherwise.
    #[serde(default)]
    pub pr_number: Option<u64>,

    #[serde(default = "defaults::poll_delay_seconds")]
    pub poll_delay_seconds: u64,
    #[serde(default = "defaults::poll_max_attempts")]
    pub poll_max_attempts: usize,
    #[serde(default = "defaults::poll_deadline_seconds")]
    pub poll_deadline_seconds: u64,
    #[serde(default = "defaults::submit_timeout_seconds")]
    pub submit_timeout_seconds: u64,
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let mut builder = ConfigRs::builder()
            .add_source(File::from(config_path.to_path_buf()).required(false))
            .add_source(Environment::with_prefix("INPUT").ignore_empty(true));

        // Ambient workflow variables are defaults only; explicit inputs win.
        for (var, key) in [
            ("GITHUB_TOKEN", "github_token"),
            ("GITHUB_REPOSITORY", "github_repository"),
            ("GITHUB_REF", "github_ref"),
            ("GITHUB_SHA", "github_sha"),
            ("GITHUB_API_URL", "github_api_url"),
        ] {
            if let Ok(value) = std::env::var(var)
                && !value.is_empty()
            {
                builder = builder.set_default(key, value)?;
            }
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// The batch request requires every identifying input; credentials are
    /// only checked for presence, the server validates them.
    fn validate(&self) -> Result<()> {
        let required = [
            ("test_name", &self.test_name),
            ("vla_endpoint", &self.vla_endpoint),
            ("model_id", &self.model_id),
            ("model_name", &self.model_name),
            ("scenario_id", &self.scenario_id),
            ("user_id", &self.user_id),
            ("project_id", &self.project_id),
            ("type", &self.eval_type),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(EvalError::Config(format!(
                    "input `{name}` must not be empty"
                )));
            }
        }

        Ok(())
    }

    /// `owner/repo` from the ambient repository variable.
    pub fn owner_and_repo(&self) -> Result<(String, String)> {
        let raw = self
            .github_repository
            .as_deref()
            .ok_or_else(|| EvalError::Config("GITHUB_REPOSITORY is not set".to_string()))?;

        raw.split_once('/')
            .map(|(owner, repo)| (owner.to_string(), repo.to_string()))
            .ok_or_else(|| EvalError::Config(format!("malformed GITHUB_REPOSITORY: `{raw}`")))
    }

    /// Branch name for push-triggered runs.
    #[must_use]
    pub fn branch(&self) -> Option<&str> {
        self.github_ref.as_deref()?.strip_prefix("refs/heads/")
    }

    /// Pull request number, if the run already knows it: the explicit input
    /// wins, else a `refs/pull/<n>/...` ref from a pull request trigger.
    #[must_use]
    pub fn pr_number_hint(&self) -> Option<u64> {
        if self.pr_number.is_some() {
            return self.pr_number;
        }

        self.github_ref
            .as_deref()?
            .strip_prefix("refs/pull/")?
            .split('/')
            .next()?
            .parse()
            .ok()
    }

    #[must_use]
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            delay: Duration::from_secs(self.poll_delay_seconds),
            max_attempts: self.poll_max_attempts,
            deadline: Duration::from_secs(self.poll_deadline_seconds),
        }
    }

    #[must_use]
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_seconds)
    }
}

impl FromStr for Config {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Self = ConfigRs::builder()
            .add_source(File::from_str(s, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;

        Ok(config)
    }
}
