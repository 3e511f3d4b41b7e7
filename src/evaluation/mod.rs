//! The evaluation flow: submit the batch, wait for the results, report on
//! the pull request.

pub mod poll;
pub mod report;
pub mod submit;

pub use poll::{
    AverageScores, BatchHandle, BatchResults, BatchStatus, PollPolicy, PollResult, Poller,
    ScenarioResult,
};
pub use report::COMMENT_MARKER;
pub use submit::{EvaluationRequest, Submitter};

use crate::config::Config;
use crate::errors::Result;
use crate::github::GithubSession;
use crate::workflow;

/// Runs the whole flow for one batch.
///
/// Comment failures are deliberately downgraded to warnings: the evaluation
/// outcome decides the exit code, not GitHub.
pub async fn run(config: &Config, dry_run: bool) -> Result<()> {
    let submitter = Submitter::new(config.ingest_url.clone(), config.submit_timeout())?;
    let poller = Poller::new(config.results_base_url.clone(), config.poll_policy())?;

    let github = if dry_run {
        None
    } else {
        Some(GithubSession::from_config(config)?)
    };

    let pr_number = match &github {
        Some(session) => {
            let _group = workflow::group("Resolving pull request");
            match session
                .resolve_pr_number(config.pr_number_hint(), config.branch())
                .await
            {
                Ok(Some(number)) => Some(number),
                Ok(None) => {
                    tracing::warn!("no open pull request found for this run, skipping comments");
                    None
                }
                Err(err) => {
                    tracing::warn!(error = %err, "pull request lookup failed, skipping comments");
                    None
                }
            }
        }
        None => None,
    };

    let handle = {
        let _group = workflow::group("Submitting evaluation batch");
        let request = EvaluationRequest::from_config(config);
        submitter.submit(&request).await?
    };

    if let (Some(session), Some(pr_number)) = (&github, pr_number) {
        let body = report::ongoing_body(
            &config.test_name,
            &config.vla_endpoint,
            &config.eval_type,
            config.github_sha.as_deref(),
        );
        if let Err(err) = session.upsert_comment(pr_number, COMMENT_MARKER, &body).await {
            tracing::warn!(error = %err, "failed to post the ongoing comment");
        }
    }

    let result = {
        let _group = workflow::group("Waiting for batch to complete");
        poller.wait_for_results(&handle).await?
    };

    let body = report::report_body(&handle, &result, config.github_sha.as_deref());

    if dry_run {
        println!("{body}");
        return Ok(());
    }

    if let (Some(session), Some(pr_number)) = (&github, pr_number) {
        let _group = workflow::group("Commenting on pull request");
        match session.upsert_comment(pr_number, COMMENT_MARKER, &body).await {
            Ok(comment) => tracing::info!(comment_id = ?comment.id, "report posted"),
            Err(err) => tracing::warn!(error = %err, "failed to post the report comment"),
        }
    } else {
        // Still surface the report in the job log when there is no PR.
        println!("{body}");
    }

    Ok(())
}
