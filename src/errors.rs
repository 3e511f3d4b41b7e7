use thiserror::Error;

/// Everything that can fail an evaluation run.
///
/// Transient per-attempt poll failures are classified inside the poll loop
/// and never surface here; these variants are the fatal outcomes plus the
/// best-effort comment failure.
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("evaluation submission failed: {0}")]
    Submission(#[source] reqwest::Error),

    #[error("ingestion endpoint rejected the batch with status {status}: {body}")]
    SubmissionRejected { status: u16, body: String },

    #[error("ingestion response did not contain a batch id")]
    MissingBatchId,

    #[error("polling failed with unexpected status {status}")]
    PollFailed { status: u16 },

    #[error("batch did not complete within {attempts} poll attempts")]
    PollTimeout { attempts: usize },

    #[error("batch completed but returned no scenarios")]
    MissingScenarios,

    #[error("failed to update the pull request comment: {0}")]
    Comment(#[source] octocrab::Error),
}

pub type Result<T> = std::result::Result<T, EvalError>;
