use serde::Serialize;
use std::sync::Arc;

use crate::catalog::Phase;
use crate::state::{FailedStep, LogEntry, StepStatus};

/// Observable changes to a run, delivered to listeners registered with
/// [`crate::Orchestrator::on_event`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WizardEvent {
    PhaseStarted {
        phase: Phase,
        label: String,
        first_index: usize,
    },
    StepStatusChanged {
        step_id: String,
        index: usize,
        status: StepStatus,
    },
    ProgressChanged {
        progress: u8,
    },
    Log(LogEntry),
    RunFinished {
        completed: bool,
        failed_step: Option<FailedStep>,
    },
}

pub type EventListener = Arc<dyn Fn(&WizardEvent) + Send + Sync>;
