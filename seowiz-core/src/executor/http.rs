use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{StepContext, StepExecutor, StepOutcome};
use crate::catalog::StepDefinition;
use crate::config::{ApiConfig, PollingConfig};
use crate::error::{WizardError, WizardResult};
use crate::poll::{poll_until, PollOptions, PollOutcome};

/// Calls step endpoints over HTTP and follows background jobs to completion.
pub struct HttpStepExecutor {
    client: Client,
    api: ApiConfig,
    default_poll: PollOptions,
}

impl HttpStepExecutor {
    pub fn new(api: ApiConfig, polling: &PollingConfig) -> Self {
        let client = Client::builder()
            .timeout(api.request_timeout())
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api,
            default_poll: polling.default_options(),
        }
    }

    pub fn api(&self) -> &ApiConfig {
        &self.api
    }

    async fn post_json(&self, endpoint: &str, body: &Value) -> WizardResult<Value> {
        let url = self.api.function_url(endpoint);
        debug!(%url, "POST step endpoint");

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body);

        if let Some(key) = &self.api.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        read_json(endpoint, response).await
    }

    async fn fetch_job(&self, job_id: &str) -> WizardResult<JobRecord> {
        let endpoint = self.api.job_status_endpoint.as_str();
        let url = self.api.function_url(endpoint);

        let mut request = self.client.get(&url).query(&[("jobId", job_id)]);
        if let Some(key) = &self.api.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let body = read_json(endpoint, response).await?;

        let parsed: JobStatusResponse =
            serde_json::from_value(body).map_err(|e| WizardError::ResponseParseError {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;
        Ok(parsed.job)
    }

    async fn wait_for_job(
        &self,
        step: &StepDefinition,
        job_id: &str,
        ctx: &StepContext,
    ) -> WizardResult<StepOutcome> {
        let options = step.job.map(PollOptions::from).unwrap_or(self.default_poll);
        info!(
            step = step.id,
            job_id,
            interval_ms = options.interval.as_millis() as u64,
            max_attempts = options.max_attempts,
            "Waiting for background job"
        );

        let outcome = poll_until(options, &ctx.abort, |attempt| async move {
            let job = self.fetch_job(job_id).await?;
            match job.status {
                JobState::Completed => Ok(Some(job.result.unwrap_or(Value::Null))),
                JobState::Failed => Err(WizardError::job_failed(
                    step.id,
                    job.error.unwrap_or_else(|| "Job failed".to_string()),
                )),
                JobState::Pending | JobState::Running => {
                    debug!(
                        step = step.id,
                        attempt,
                        progress = ?job.progress,
                        "Job still in progress"
                    );
                    Ok(None)
                }
            }
        })
        .await?;

        match outcome {
            PollOutcome::Ready(result) => Ok(StepOutcome::Completed(result)),
            PollOutcome::Aborted => Ok(StepOutcome::Aborted),
            PollOutcome::TimedOut { attempts } => {
                warn!(step = step.id, job_id, attempts, "Job polling budget exhausted");
                Err(WizardError::JobTimeout {
                    step: step.id.to_string(),
                    title: step.title.to_string(),
                    minutes: options.budget_minutes(),
                })
            }
        }
    }
}

#[async_trait]
impl StepExecutor for HttpStepExecutor {
    fn name(&self) -> &str {
        "http"
    }

    async fn execute(&self, step: &StepDefinition, ctx: &StepContext) -> WizardResult<StepOutcome> {
        let mut body = json!({
            "siteId": ctx.site_id,
            "stepId": step.id,
            "runId": ctx.run_id,
        });
        if let Some(domain) = &ctx.domain {
            body["domain"] = json!(domain);
        }

        let response = self.post_json(step.endpoint, &body).await?;

        if ctx.abort.is_stale() {
            return Ok(StepOutcome::Aborted);
        }

        match extract_job_id(&response) {
            Some(job_id) => self.wait_for_job(step, &job_id, ctx).await,
            None => Ok(StepOutcome::Completed(response)),
        }
    }

    async fn mark_setup_complete(&self, site_id: &str, skipped: bool) -> WizardResult<()> {
        let body = json!({ "siteId": site_id, "skipped": skipped });
        self.post_json(&self.api.complete_endpoint, &body).await?;
        info!(site_id, skipped, "Setup completion recorded");
        Ok(())
    }
}

async fn read_json(endpoint: &str, response: Response) -> WizardResult<Value> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| error_message(&v))
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        warn!(endpoint, status = status.as_u16(), %message, "Step endpoint returned an error");
        return Err(WizardError::remote(endpoint, Some(status.as_u16()), message));
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&text).map_err(|e| WizardError::ResponseParseError {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

fn error_message(body: &Value) -> Option<String> {
    ["error", "message"].iter().find_map(|key| match body.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Object(obj)) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    })
}

/// A job handle is either a top-level `jobId` or a nested `job.id`.
pub fn extract_job_id(body: &Value) -> Option<String> {
    let raw = body
        .get("jobId")
        .or_else(|| body.get("job").and_then(|job| job.get("id")))?;

    match raw {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    job: JobRecord,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobRecord {
    pub status: JobState,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[serde(alias = "queued")]
    Pending,
    #[serde(alias = "processing")]
    Running,
    #[serde(alias = "succeeded")]
    Completed,
    #[serde(alias = "error")]
    Failed,
}
