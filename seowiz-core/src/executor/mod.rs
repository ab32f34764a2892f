mod http;

pub use http::{extract_job_id, HttpStepExecutor, JobRecord, JobState};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::abort::AbortToken;
use crate::catalog::StepDefinition;
use crate::error::WizardResult;

/// What an executor needs to know about the run a step belongs to.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub run_id: Uuid,
    pub site_id: String,
    pub domain: Option<String>,
    pub abort: AbortToken,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The step finished; carries the endpoint's (or job's) result payload.
    Completed(Value),
    /// The run was superseded while this step was in flight.
    Aborted,
}

/// Runs a single catalog step against whatever backend does the work.
///
/// Implementations must honour `ctx.abort`: once it goes stale, the step
/// should return [`StepOutcome::Aborted`] instead of a result.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, step: &StepDefinition, ctx: &StepContext) -> WizardResult<StepOutcome>;

    /// Persist that setup finished (or was skipped) for `site_id`.
    async fn mark_setup_complete(&self, site_id: &str, skipped: bool) -> WizardResult<()>;
}
