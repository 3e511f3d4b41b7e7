//! Polls the results API until the batch reaches its terminal status.
//!
//! The loop is deliberately dumb: a fixed delay, a bounded attempt budget and
//! a wall-clock deadline, whichever trips first. The results route commonly
//! 404s until the backend has materialized the batch, so "not found" is a
//! normal answer here, not a failure.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::errors::{EvalError, Result};

/// Identifies a submitted batch; everything needed to fetch its results.
#[derive(Debug, Clone)]
pub struct BatchHandle {
    pub batch_id: String,
    pub user_id: String,
    pub project_id: String,
}

/// Status reported by the results endpoint.
///
/// Matched case-insensitively; older backend revisions capitalize the
/// terminal token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchStatus {
    Queued,
    Running,
    Complete,
    Failed,
    #[default]
    Unknown,
}

impl BatchStatus {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "complete" => Self::Complete,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl<'de> Deserialize<'de> for BatchStatus {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;

        Ok(Self::parse(&raw))
    }
}

/// One full response of the results endpoint. Every poll attempt replaces
/// the previous result wholesale, nothing is merged.
#[derive(Debug, Clone, Deserialize)]
pub struct PollResult {
    #[serde(default)]
    pub status: BatchStatus,
    /// Dashboard link for the batch.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub results: BatchResults,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResults {
    #[serde(default)]
    pub scenarios: Vec<ScenarioResult>,
    #[serde(default)]
    pub average_scores: Option<AverageScores>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    #[serde(default, alias = "scenarioName")]
    pub name: Option<String>,
    #[serde(default)]
    pub average_scores: AverageScores,
}

/// The three score channels. LLM judges score 0-3, metadata extraction 0-1;
/// any channel may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct AverageScores {
    #[serde(default)]
    pub openai: Option<f64>,
    #[serde(default)]
    pub ionos: Option<f64>,
    #[serde(default)]
    pub metadata: Option<f64>,
}

/// Timing policy for the poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// Fixed delay before every attempt, including the first.
    pub delay: Duration,
    /// Hard cap on issued GET requests; transient failures count too.
    pub max_attempts: usize,
    /// Wall-clock cap on the whole poll phase.
    pub deadline: Duration,
}

enum PollAttempt {
    Result(PollResult),
    /// Transient; counts against the budget but keeps the loop going.
    NotReady(String),
}

#[derive(Debug, Clone)]
pub struct Poller {
    client: reqwest::Client,
    results_base_url: Url,
    policy: PollPolicy,
}

impl Poller {
    pub fn new(results_base_url: Url, policy: PollPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| {
                EvalError::Config(format!("failed to build results HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            results_base_url,
            policy,
        })
    }

    /// Polls until the batch reports complete with scenarios attached, the
    /// attempt budget is spent, or the deadline passes.
    #[tracing::instrument(skip_all, fields(batch_id = %handle.batch_id))]
    pub async fn wait_for_results(&self, handle: &BatchHandle) -> Result<PollResult> {
        let url = self.results_url(handle)?;
        let started = tokio::time::Instant::now();

        for attempt in 1..=self.policy.max_attempts {
            if started.elapsed() + self.policy.delay > self.policy.deadline {
                tracing::warn!(attempt, "poll deadline reached before the attempt budget");
                return Err(EvalError::PollTimeout {
                    attempts: attempt - 1,
                });
            }

            tokio::time::sleep(self.policy.delay).await;

            match self.fetch(&url).await? {
                PollAttempt::Result(result) => {
                    tracing::info!(attempt, status = ?result.status, "poll attempt answered");

                    if result.status == BatchStatus::Complete {
                        if result.results.scenarios.is_empty() {
                            return Err(EvalError::MissingScenarios);
                        }
                        return Ok(result);
                    }
                }
                PollAttempt::NotReady(reason) => {
                    tracing::info!(attempt, %reason, "results not ready yet");
                }
            }
        }

        Err(EvalError::PollTimeout {
            attempts: self.policy.max_attempts,
        })
    }

    async fn fetch(&self, url: &Url) -> Result<PollAttempt> {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            // Network blips are indistinguishable from a backend that is
            // still warming up; let the budget decide.
            Err(err) => return Ok(PollAttempt::NotReady(err.to_string())),
        };

        let status = response.status();
        if status.is_success() {
            return match response.json::<PollResult>().await {
                Ok(result) => Ok(PollAttempt::Result(result)),
                Err(err) => Ok(PollAttempt::NotReady(format!(
                    "undecodable response: {err}"
                ))),
            };
        }

        if is_transient(status) {
            return Ok(PollAttempt::NotReady(format!("status {status}")));
        }

        Err(EvalError::PollFailed {
            status: status.as_u16(),
        })
    }

    fn results_url(&self, handle: &BatchHandle) -> Result<Url> {
        let url = format!(
            "{}/fetch_results/{}/{}/{}",
            self.results_base_url.as_str().trim_end_matches('/'),
            handle.user_id,
            handle.project_id,
            handle.batch_id,
        );

        Url::parse(&url).map_err(|err| EvalError::Config(format!("invalid results URL: {err}")))
    }
}

/// 404/405 mean the results route does not exist yet; 5xx are assumed to be
/// blips. Anything else client-side is a real bug in the request.
fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND
        || status == StatusCode::METHOD_NOT_ALLOWED
        || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RESULTS_PATH: &str = "/fetch_results/u-1/p-1/b-1";

    fn test_policy(max_attempts: usize) -> PollPolicy {
        PollPolicy {
            delay: Duration::from_millis(5),
            max_attempts,
            deadline: Duration::from_secs(5),
        }
    }

    fn handle() -> BatchHandle {
        BatchHandle {
            batch_id: "b-1".to_string(),
            user_id: "u-1".to_string(),
            project_id: "p-1".to_string(),
        }
    }

    fn poller(server: &MockServer, max_attempts: usize) -> Poller {
        Poller::new(Url::parse(&server.uri()).unwrap(), test_policy(max_attempts)).unwrap()
    }

    fn queued() -> serde_json::Value {
        json!({ "status": "queued" })
    }

    fn complete() -> serde_json::Value {
        json!({
            "status": "Complete",
            "url": "https://eval.example.com/batches/b-1",
            "results": {
                "scenarios": [{
                    "scenarioName": "Greeting",
                    "averageScores": { "openai": 2.4, "ionos": 1.8, "metadata": 1.0 }
                }],
                "averageScores": { "openai": 2.4, "ionos": 1.8, "metadata": 1.0 }
            }
        })
    }

    #[test]
    fn status_tokens_parse_case_insensitively() {
        assert_eq!(BatchStatus::parse("queued"), BatchStatus::Queued);
        assert_eq!(BatchStatus::parse("complete"), BatchStatus::Complete);
        assert_eq!(BatchStatus::parse("Complete"), BatchStatus::Complete);
        assert_eq!(BatchStatus::parse("exploded"), BatchStatus::Unknown);
    }

    #[test]
    fn scenario_names_accept_both_wire_spellings() {
        let result: PollResult = serde_json::from_value(complete()).unwrap();
        assert_eq!(result.results.scenarios[0].name.as_deref(), Some("Greeting"));

        let result: PollResult = serde_json::from_value(json!({
            "status": "complete",
            "results": { "scenarios": [{ "name": "Greeting" }] }
        }))
        .unwrap();
        assert_eq!(result.results.scenarios[0].name.as_deref(), Some("Greeting"));
        assert_eq!(result.results.scenarios[0].average_scores, AverageScores::default());
    }

    #[test_log::test(tokio::test)]
    async fn stops_on_the_attempt_that_completes() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(RESULTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(queued()))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(RESULTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(complete()))
            .expect(1)
            .mount(&server)
            .await;

        let result = poller(&server, 10).wait_for_results(&handle()).await.unwrap();

        assert_eq!(result.status, BatchStatus::Complete);
        assert_eq!(result.results.scenarios.len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn exhausts_the_attempt_budget_and_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(RESULTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(queued()))
            .expect(3)
            .mount(&server)
            .await;

        let err = poller(&server, 3).wait_for_results(&handle()).await.unwrap_err();

        assert!(matches!(err, EvalError::PollTimeout { attempts: 3 }));
    }

    #[test_log::test(tokio::test)]
    async fn not_found_counts_against_the_budget() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(RESULTS_PATH))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let err = poller(&server, 2).wait_for_results(&handle()).await.unwrap_err();

        assert!(matches!(err, EvalError::PollTimeout { attempts: 2 }));
    }

    #[test_log::test(tokio::test)]
    async fn unexpected_client_errors_are_fatal() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(RESULTS_PATH))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let err = poller(&server, 5).wait_for_results(&handle()).await.unwrap_err();

        assert!(matches!(err, EvalError::PollFailed { status: 400 }));
    }

    #[test_log::test(tokio::test)]
    async fn complete_without_scenarios_is_fatal() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(RESULTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "complete",
                "results": { "scenarios": [] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = poller(&server, 5).wait_for_results(&handle()).await.unwrap_err();

        assert!(matches!(err, EvalError::MissingScenarios));
    }

    #[test_log::test(tokio::test)]
    async fn the_deadline_caps_the_loop_before_the_budget() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(RESULTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(queued()))
            .mount(&server)
            .await;

        let policy = PollPolicy {
            delay: Duration::from_millis(30),
            max_attempts: 1000,
            deadline: Duration::from_millis(100),
        };
        let poller = Poller::new(Url::parse(&server.uri()).unwrap(), policy).unwrap();

        let err = poller.wait_for_results(&handle()).await.unwrap_err();

        let EvalError::PollTimeout { attempts } = err else {
            panic!("expected a poll timeout, got {err}");
        };
        assert!(attempts < 1000);
    }
}
