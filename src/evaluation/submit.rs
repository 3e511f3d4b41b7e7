//! Submits the evaluation batch to the ingestion endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{ApiKey, Config};
use crate::errors::{EvalError, Result};

use super::poll::BatchHandle;

/// Body of the ingestion POST, field names exactly as the backend expects
/// them.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRequest {
    pub test_name: String,
    pub vla_endpoint: String,
    pub vla_credentials: ApiKey,
    pub model_id: String,
    pub model_name: String,
    pub scenario_id: String,
    pub user_id: String,
    pub project_id: String,
    pub attempts: u32,
    #[serde(rename = "type")]
    pub eval_type: String,
}

impl EvaluationRequest {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            test_name: config.test_name.clone(),
            vla_endpoint: config.vla_endpoint.clone(),
            vla_credentials: config.vla_credentials.clone(),
            model_id: config.model_id.clone(),
            model_name: config.model_name.clone(),
            scenario_id: config.scenario_id.clone(),
            user_id: config.user_id.clone(),
            project_id: config.project_id.clone(),
            attempts: config.attempts,
            eval_type: config.eval_type.clone(),
        }
    }
}

/// Only the batch id matters from the ingestion response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponse {
    #[serde(default)]
    batch_test_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Submitter {
    client: reqwest::Client,
    ingest_url: Url,
}

impl Submitter {
    /// The ingestion call spins up the batch synchronously before answering,
    /// so the request timeout is generous.
    pub fn new(ingest_url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|err| {
                EvalError::Config(format!("failed to build ingestion HTTP client: {err}"))
            })?;

        Ok(Self { client, ingest_url })
    }

    /// Issues the single ingestion POST and extracts the batch handle.
    ///
    /// Submission is attempted exactly once; any failure here fails the run.
    #[tracing::instrument(skip_all, err)]
    pub async fn submit(&self, request: &EvaluationRequest) -> Result<BatchHandle> {
        tracing::info!(test_name = %request.test_name, "submitting evaluation batch");

        let response = self
            .client
            .post(self.ingest_url.clone())
            .json(request)
            .send()
            .await
            .map_err(EvalError::Submission)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EvalError::SubmissionRejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: IngestResponse = response.json().await.map_err(EvalError::Submission)?;
        let batch_id = body
            .batch_test_id
            .filter(|id| !id.is_empty())
            .ok_or(EvalError::MissingBatchId)?;

        tracing::info!(%batch_id, "batch accepted");

        Ok(BatchHandle {
            batch_id,
            user_id: request.user_id.clone(),
            project_id: request.project_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> EvaluationRequest {
        EvaluationRequest {
            test_name: "nightly".to_string(),
            vla_endpoint: "https://agent.example.com".to_string(),
            vla_credentials: ApiKey::new("agent-secret"),
            model_id: "model-1".to_string(),
            model_name: "gpt-4".to_string(),
            scenario_id: "S1".to_string(),
            user_id: "u-1".to_string(),
            project_id: "p-1".to_string(),
            attempts: 1,
            eval_type: "multiAgent".to_string(),
        }
    }

    fn submitter(server: &MockServer) -> Submitter {
        let url = Url::parse(&format!("{}/ingest_event", server.uri())).unwrap();

        Submitter::new(url, Duration::from_secs(5)).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn submits_once_and_returns_the_batch_handle() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ingest_event"))
            .and(body_partial_json(json!({
                "test_name": "nightly",
                "vla_credentials": "agent-secret",
                "model_id": "model-1",
                "attempts": 1,
                "type": "multiAgent",
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "batchTestId": "batch-9" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let handle = submitter(&server).submit(&request()).await.unwrap();

        assert_eq!(handle.batch_id, "batch-9");
        assert_eq!(handle.user_id, "u-1");
        assert_eq!(handle.project_id, "p-1");
    }

    #[test_log::test(tokio::test)]
    async fn a_response_without_a_batch_id_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ingest_event"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accepted": true })))
            .expect(1)
            .mount(&server)
            .await;

        let err = submitter(&server).submit(&request()).await.unwrap_err();

        assert!(matches!(err, EvalError::MissingBatchId));
    }

    #[test_log::test(tokio::test)]
    async fn a_rejected_submission_is_fatal_and_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ingest_event"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let err = submitter(&server).submit(&request()).await.unwrap_err();

        let EvalError::SubmissionRejected { status, body } = err else {
            panic!("expected a rejected submission, got {err}");
        };
        assert_eq!(status, 500);
        assert_eq!(body, "boom");
    }
}
