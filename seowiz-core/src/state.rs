use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::catalog::Phase;
use crate::error::{WizardError, WizardResult};

const MAX_LOG_ENTRIES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Error,
    Skipped,
}

impl StepStatus {
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Error | StepStatus::Skipped
        )
    }

    /// Statuses only move forward: pending, then running, then a settled state.
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Pending, StepStatus::Skipped)
                | (StepStatus::Running, StepStatus::Completed)
                | (StepStatus::Running, StepStatus::Error)
                | (StepStatus::Running, StepStatus::Skipped)
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Error => write!(f, "error"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// The step that halted the run, as shown in the failure panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
    pub id: String,
    pub title: String,
    pub error: String,
    pub step_index: usize,
}

/// Everything the wizard knows about one setup run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub site_id: String,
    pub is_running: bool,
    pub current_step_index: usize,
    pub current_phase: Option<Phase>,
    pub progress: u8,
    #[serde(default)]
    pub statuses: HashMap<String, StepStatus>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    pub failed_step: Option<FailedStep>,
    pub abort_generation: u64,
    #[serde(default)]
    pub setup_complete: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new(site_id: impl Into<String>, abort_generation: u64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            site_id: site_id.into(),
            is_running: false,
            current_step_index: 0,
            current_phase: None,
            progress: 0,
            statuses: HashMap::new(),
            logs: Vec::new(),
            failed_step: None,
            abort_generation,
            setup_complete: false,
            started_at: None,
            finished_at: None,
        }
    }

    /// Absent entries read as pending.
    pub fn status_of(&self, step_id: &str) -> StepStatus {
        self.statuses.get(step_id).copied().unwrap_or_default()
    }

    pub fn transition(&mut self, step_id: &str, next: StepStatus) -> WizardResult<()> {
        let current = self.status_of(step_id);
        if !current.can_transition_to(next) {
            return Err(WizardError::InvalidStatusTransition {
                step: step_id.to_string(),
                from: current,
                to: next,
            });
        }
        self.statuses.insert(step_id.to_string(), next);
        Ok(())
    }

    /// Move a step back to pending. Only restart actions call this.
    pub fn reset_step(&mut self, step_id: &str) {
        self.statuses.remove(step_id);
    }

    /// Progress never moves backwards within a run.
    pub fn raise_progress(&mut self, value: u8) -> bool {
        let value = value.min(100);
        if value > self.progress {
            self.progress = value;
            true
        } else {
            false
        }
    }

    pub fn push_log(&mut self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        };
        self.logs.push(entry.clone());
        if self.logs.len() > MAX_LOG_ENTRIES {
            let drain_count = self.logs.len() - MAX_LOG_ENTRIES;
            self.logs.drain(0..drain_count);
        }
        entry
    }

    pub fn count_with_status(&self, status: StepStatus) -> usize {
        self.statuses.values().filter(|s| **s == status).count()
    }

    pub fn last_log(&self) -> Option<&LogEntry> {
        self.logs.last()
    }
}

/// Maps `completed` of `total` steps onto whole percent, rounding half up.
pub fn percent_of(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (completed as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}
