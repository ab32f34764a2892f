//! Drives a setup run through the step catalog.
//!
//! Every entry point (fresh start, retry, restart of the current step) funnels
//! into one phase-aware loop that walks [`Phase::ALL`] from a starting catalog
//! index. Sequential phases run one step at a time; the concurrent phase
//! launches its remaining steps together while a ticker samples progress.
//!
//! All state writes go through [`Orchestrator::update`], which drops the write
//! when the caller's [`AbortToken`] is stale. A superseded loop therefore
//! winds down without touching the state of the run that replaced it.

use chrono::Utc;
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::abort::{AbortController, AbortToken};
use crate::catalog::{FailurePolicy, Phase, StepCatalog, StepDefinition};
use crate::config::ProgressConfig;
use crate::error::{WizardError, WizardResult};
use crate::events::{EventListener, WizardEvent};
use crate::executor::{StepContext, StepExecutor, StepOutcome};
use crate::state::{percent_of, FailedStep, LogLevel, RunState, StepStatus};

/// `tokio::time::interval` rejects a zero period.
const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// How a call into the orchestrator ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed(FailedStep),
    /// A newer abort generation took over before this loop finished.
    Superseded,
    /// A run was already active; nothing was started.
    AlreadyRunning,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

enum StepRun {
    Completed,
    Skipped,
    SoftFailed,
    Halted(FailedStep),
    Aborted,
}

enum PhaseFlow {
    Continue,
    Halt(FailedStep),
    Superseded,
}

pub struct Orchestrator {
    site_id: String,
    domain: Option<String>,
    catalog: Arc<StepCatalog>,
    executor: Arc<dyn StepExecutor>,
    progress: ProgressConfig,
    state: Arc<RwLock<RunState>>,
    abort: AbortController,
    listeners: Arc<RwLock<Vec<EventListener>>>,
}

impl Orchestrator {
    pub fn new(site_id: impl Into<String>, executor: Arc<dyn StepExecutor>) -> Self {
        let site_id = site_id.into();
        let abort = AbortController::new();
        let state = RunState::new(site_id.clone(), abort.generation());

        Self {
            site_id,
            domain: None,
            catalog: Arc::new(StepCatalog::default()),
            executor,
            progress: ProgressConfig::default(),
            state: Arc::new(RwLock::new(state)),
            abort,
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Rebuild an orchestrator around a persisted run.
    ///
    /// Whatever loop produced the snapshot is gone, so the run is marked idle
    /// and steps caught mid-flight go back to pending.
    pub fn from_state(mut state: RunState, executor: Arc<dyn StepExecutor>) -> Self {
        state.is_running = false;
        state
            .statuses
            .retain(|_, status| *status != StepStatus::Running);

        let abort = AbortController::starting_at(state.abort_generation);
        let site_id = state.site_id.clone();

        Self {
            site_id,
            domain: None,
            catalog: Arc::new(StepCatalog::default()),
            executor,
            progress: ProgressConfig::default(),
            state: Arc::new(RwLock::new(state)),
            abort,
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_catalog(mut self, catalog: StepCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_progress(mut self, progress: ProgressConfig) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    pub fn abort_generation(&self) -> u64 {
        self.abort.generation()
    }

    pub async fn on_event<F>(&self, listener: F)
    where
        F: Fn(&WizardEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write().await;
        listeners.push(Arc::new(listener));
    }

    pub async fn snapshot(&self) -> RunState {
        self.state.read().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.state.read().await.is_running
    }

    pub async fn progress(&self) -> u8 {
        self.state.read().await.progress
    }

    pub async fn status_of(&self, step_id: &str) -> StepStatus {
        self.state.read().await.status_of(step_id)
    }

    pub async fn failed_step(&self) -> Option<FailedStep> {
        self.state.read().await.failed_step.clone()
    }

    // ------------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------------

    /// Begin a fresh run from the first step. A no-op while a run is active.
    pub async fn start(&self) -> WizardResult<RunOutcome> {
        let token = {
            let mut state = self.state.write().await;
            if state.is_running {
                info!(site_id = %self.site_id, "Setup run already active, ignoring start");
                return Ok(RunOutcome::AlreadyRunning);
            }

            let token = self.abort.token();
            *state = RunState::new(self.site_id.clone(), token.generation());
            state.is_running = true;
            state.started_at = Some(Utc::now());
            token
        };

        self.drive(0, token).await
    }

    /// Abort anything in flight and return to the never-run state.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        let generation = self.abort.bump();
        *state = RunState::new(self.site_id.clone(), generation);
        info!(site_id = %self.site_id, generation, "Run state reset");
    }

    pub async fn restart_from_beginning(&self) -> WizardResult<RunOutcome> {
        self.reset().await;
        self.start().await
    }

    /// Resume from the step that halted the last run.
    pub async fn retry_failed(&self) -> WizardResult<RunOutcome> {
        let failed = self
            .failed_step()
            .await
            .ok_or(WizardError::NothingToRetry)?;
        self.retry_from(&failed.id).await
    }

    /// Clear `step_id` and everything after it, then run from there.
    pub async fn retry_from(&self, step_id: &str) -> WizardResult<RunOutcome> {
        let index = self
            .catalog
            .find_step_index(step_id)
            .ok_or_else(|| WizardError::StepNotFound(step_id.to_string()))?;

        let (token, events) = {
            let mut state = self.state.write().await;
            if state.is_running {
                info!(site_id = %self.site_id, step_id, "Setup run already active, ignoring retry");
                return Ok(RunOutcome::AlreadyRunning);
            }

            let token = self.abort.token();
            let mut events = Vec::new();
            self.rewind(&mut state, index, token.generation());
            push_log(
                &mut state,
                &mut events,
                LogLevel::Info,
                format!("Retrying from {}", self.title_at(index)),
            );
            (token, events)
        };

        self.emit(events).await;
        self.drive(index, token).await
    }

    /// Supersede whatever is running and rerun from the current step.
    pub async fn restart_current_step(&self) -> WizardResult<RunOutcome> {
        let (token, index, events) = {
            let mut state = self.state.write().await;
            let token = self.abort.renew();
            let index = state
                .current_step_index
                .min(self.catalog.len().saturating_sub(1));
            let mut events = Vec::new();
            self.rewind(&mut state, index, token.generation());
            push_log(
                &mut state,
                &mut events,
                LogLevel::Warning,
                format!("Restarting {}", self.title_at(index)),
            );
            (token, index, events)
        };

        info!(
            site_id = %self.site_id,
            index,
            generation = token.generation(),
            "Restarting current step"
        );
        self.emit(events).await;
        self.drive(index, token).await
    }

    /// Abandon the run, mark every unsettled step skipped and record setup
    /// as complete with `skipped = true`.
    pub async fn skip_setup(&self) -> WizardResult<()> {
        let (token, events) = {
            let mut state = self.state.write().await;
            let token = self.abort.renew();
            let mut events = Vec::new();
            for (index, step) in self.catalog.iter().enumerate() {
                if !state.status_of(step.id).is_settled() {
                    set_status(&mut state, &mut events, index, step.id, StepStatus::Skipped)?;
                }
            }
            state.is_running = false;
            state.failed_step = None;
            state.abort_generation = token.generation();
            state.finished_at = Some(Utc::now());
            push_log(&mut state, &mut events, LogLevel::Warning, "Setup skipped");
            (token, events)
        };
        self.emit(events).await;

        self.executor.mark_setup_complete(&self.site_id, true).await?;

        self.update(&token, |state, events| {
            state.setup_complete = true;
            events.push(WizardEvent::RunFinished {
                completed: true,
                failed_step: None,
            });
        })
        .await;

        info!(site_id = %self.site_id, "Setup skipped");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // The run loop
    // ------------------------------------------------------------------------

    async fn drive(&self, start: usize, token: AbortToken) -> WizardResult<RunOutcome> {
        let run_id = self.state.read().await.run_id;
        let ctx = StepContext {
            run_id,
            site_id: self.site_id.clone(),
            domain: self.domain.clone(),
            abort: token,
        };

        match self.run_phases(start, &ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                err.log();
                let message = err.display_message();
                self.update(&ctx.abort, |state, events| {
                    state.is_running = false;
                    state.finished_at = Some(Utc::now());
                    push_log(
                        state,
                        events,
                        LogLevel::Error,
                        format!("Setup stopped: {}", message),
                    );
                })
                .await;
                Err(err)
            }
        }
    }

    async fn run_phases(&self, start: usize, ctx: &StepContext) -> WizardResult<RunOutcome> {
        info!(
            site_id = %self.site_id,
            start,
            generation = ctx.abort.generation(),
            executor = self.executor.name(),
            "Setup run starting"
        );

        for phase in Phase::ALL {
            let steps = self.catalog.indexed_steps_from(phase, start);
            let Some(&(first_index, _)) = steps.first() else {
                continue;
            };

            if !self.enter_phase(&ctx.abort, phase, first_index).await {
                return Ok(RunOutcome::Superseded);
            }

            let flow = if phase.is_concurrent() {
                self.run_concurrent(ctx, &steps).await?
            } else {
                self.run_sequential(ctx, &steps).await?
            };

            match flow {
                PhaseFlow::Continue => {}
                PhaseFlow::Halt(failed) => return Ok(self.finish_failed(&ctx.abort, failed).await),
                PhaseFlow::Superseded => {
                    debug!(phase = %phase, "Run superseded");
                    return Ok(RunOutcome::Superseded);
                }
            }
        }

        self.finish_completed(&ctx.abort).await
    }

    async fn enter_phase(&self, token: &AbortToken, phase: Phase, first_index: usize) -> bool {
        info!(phase = %phase, first_index, "Entering phase");
        self.update(token, |state, events| {
            state.current_phase = Some(phase);
            state.current_step_index = first_index;
            events.push(WizardEvent::PhaseStarted {
                phase,
                label: phase.label().to_string(),
                first_index,
            });
            push_log(state, events, LogLevel::Info, format!("Phase: {}", phase.label()));
        })
        .await
        .is_some()
    }

    async fn run_sequential(
        &self,
        ctx: &StepContext,
        steps: &[(usize, &StepDefinition)],
    ) -> WizardResult<PhaseFlow> {
        let total = self.catalog.len();

        for &(index, step) in steps {
            match self.run_step(ctx, index, step, true).await? {
                StepRun::Aborted => return Ok(PhaseFlow::Superseded),
                StepRun::Halted(failed) => return Ok(PhaseFlow::Halt(failed)),
                StepRun::Completed | StepRun::Skipped | StepRun::SoftFailed => {}
            }

            if self
                .raise_progress(&ctx.abort, percent_of(index + 1, total))
                .await
                .is_none()
            {
                return Ok(PhaseFlow::Superseded);
            }
        }

        Ok(PhaseFlow::Continue)
    }

    async fn run_concurrent(
        &self,
        ctx: &StepContext,
        steps: &[(usize, &StepDefinition)],
    ) -> WizardResult<PhaseFlow> {
        let token = &ctx.abort;
        let total = steps.len();
        let settled = AtomicUsize::new(0);

        info!(count = total, "Launching parallel batch");

        let batch = join_all(steps.iter().map(|&(index, step)| {
            let settled = &settled;
            async move {
                let run = self.run_step(ctx, index, step, false).await;
                settled.fetch_add(1, Ordering::SeqCst);
                run
            }
        }));
        tokio::pin!(batch);

        let mut ticker = interval(self.progress.sample_interval().max(MIN_SAMPLE_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let results = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(PhaseFlow::Superseded),
                results = &mut batch => break results,
                _ = ticker.tick() => {
                    let value = self
                        .progress
                        .parallel_percent(settled.load(Ordering::SeqCst), total);
                    if self.raise_progress(token, value).await.is_none() {
                        return Ok(PhaseFlow::Superseded);
                    }
                }
            }
        };

        let mut succeeded = 0;
        let mut failed = 0;
        for run in results {
            match run? {
                StepRun::Completed => succeeded += 1,
                StepRun::Skipped | StepRun::SoftFailed | StepRun::Halted(_) => failed += 1,
                StepRun::Aborted => return Ok(PhaseFlow::Superseded),
            }
        }

        info!(succeeded, failed, "Parallel batch finished");

        let floor = self.progress.parallel_end;
        let level = if failed == 0 {
            LogLevel::Success
        } else {
            LogLevel::Warning
        };
        let summary = format!(
            "Parallel analysis finished: {} succeeded, {} failed",
            succeeded, failed
        );

        let applied = self
            .update(token, |state, events| {
                raise_progress(state, events, floor);
                push_log(state, events, level, summary);
            })
            .await;

        Ok(match applied {
            Some(()) => PhaseFlow::Continue,
            None => PhaseFlow::Superseded,
        })
    }

    async fn run_step(
        &self,
        ctx: &StepContext,
        index: usize,
        step: &StepDefinition,
        track_current: bool,
    ) -> WizardResult<StepRun> {
        let token = &ctx.abort;

        let started = self
            .update(token, |state, events| -> WizardResult<()> {
                if track_current {
                    state.current_step_index = index;
                }
                set_status(state, events, index, step.id, StepStatus::Running)?;
                push_log(state, events, LogLevel::Info, format!("Starting {}", step.title));
                Ok(())
            })
            .await;
        match started {
            None => return Ok(StepRun::Aborted),
            Some(result) => result?,
        }

        debug!(step = step.id, index, "Executing step");

        match self.executor.execute(step, ctx).await {
            Ok(StepOutcome::Aborted) => Ok(StepRun::Aborted),
            Ok(StepOutcome::Completed(_)) => {
                let finished = self
                    .update(token, |state, events| -> WizardResult<()> {
                        set_status(state, events, index, step.id, StepStatus::Completed)?;
                        push_log(
                            state,
                            events,
                            LogLevel::Success,
                            format!("{} completed", step.title),
                        );
                        Ok(())
                    })
                    .await;
                match finished {
                    None => Ok(StepRun::Aborted),
                    Some(result) => result.map(|_| StepRun::Completed),
                }
            }
            Err(err) => self.settle_failure(token, index, step, err).await,
        }
    }

    async fn settle_failure(
        &self,
        token: &AbortToken,
        index: usize,
        step: &StepDefinition,
        err: WizardError,
    ) -> WizardResult<StepRun> {
        let message = err.display_message();
        warn!(
            step = step.id,
            code = err.error_code(),
            optional = step.optional,
            error = %err,
            "Step failed"
        );

        let policy = step.phase.failure_policy();
        let settled = self
            .update(token, |state, events| -> WizardResult<StepRun> {
                if step.optional {
                    set_status(state, events, index, step.id, StepStatus::Skipped)?;
                    push_log(
                        state,
                        events,
                        LogLevel::Warning,
                        format!("{} skipped: {}", step.title, message),
                    );
                    return Ok(StepRun::Skipped);
                }

                set_status(state, events, index, step.id, StepStatus::Error)?;
                match policy {
                    FailurePolicy::SoftFail => {
                        push_log(
                            state,
                            events,
                            LogLevel::Warning,
                            format!("{} failed: {}", step.title, message),
                        );
                        Ok(StepRun::SoftFailed)
                    }
                    FailurePolicy::StopOnFailure => {
                        push_log(
                            state,
                            events,
                            LogLevel::Error,
                            format!("{} failed: {}", step.title, message),
                        );
                        Ok(StepRun::Halted(FailedStep {
                            id: step.id.to_string(),
                            title: step.title.to_string(),
                            error: message.clone(),
                            step_index: index,
                        }))
                    }
                }
            })
            .await;

        settled.unwrap_or(Ok(StepRun::Aborted))
    }

    async fn finish_failed(&self, token: &AbortToken, failed: FailedStep) -> RunOutcome {
        error!(
            site_id = %self.site_id,
            step = %failed.id,
            index = failed.step_index,
            error = %failed.error,
            "Setup run halted"
        );

        let applied = self
            .update(token, |state, events| {
                state.is_running = false;
                state.failed_step = Some(failed.clone());
                state.finished_at = Some(Utc::now());
                events.push(WizardEvent::RunFinished {
                    completed: false,
                    failed_step: Some(failed.clone()),
                });
            })
            .await;

        match applied {
            Some(()) => RunOutcome::Failed(failed),
            None => RunOutcome::Superseded,
        }
    }

    async fn finish_completed(&self, token: &AbortToken) -> WizardResult<RunOutcome> {
        if token.is_stale() {
            return Ok(RunOutcome::Superseded);
        }

        let persist_error = match self.executor.mark_setup_complete(&self.site_id, false).await {
            Ok(()) => None,
            Err(err) => {
                warn!(site_id = %self.site_id, error = %err, "Failed to record setup completion");
                Some(err.display_message())
            }
        };

        let applied = self
            .update(token, |state, events| {
                raise_progress(state, events, 100);
                state.is_running = false;
                state.setup_complete = persist_error.is_none();
                state.finished_at = Some(Utc::now());
                if let Some(message) = &persist_error {
                    push_log(
                        state,
                        events,
                        LogLevel::Warning,
                        format!("Could not record setup completion: {}", message),
                    );
                }
                push_log(state, events, LogLevel::Success, "SEO setup complete");
                events.push(WizardEvent::RunFinished {
                    completed: true,
                    failed_step: None,
                });
            })
            .await;

        if applied.is_none() {
            return Ok(RunOutcome::Superseded);
        }

        info!(site_id = %self.site_id, "Setup run completed");
        Ok(RunOutcome::Completed)
    }

    // ------------------------------------------------------------------------
    // State plumbing
    // ------------------------------------------------------------------------

    /// Apply `f` to the run state unless `token` has gone stale, then deliver
    /// the events it produced. Returns `None` when the write was dropped.
    async fn update<F, R>(&self, token: &AbortToken, f: F) -> Option<R>
    where
        F: FnOnce(&mut RunState, &mut Vec<WizardEvent>) -> R,
    {
        let (result, events) = {
            let mut state = self.state.write().await;
            if token.is_stale() {
                return None;
            }
            let mut events = Vec::new();
            let result = f(&mut state, &mut events);
            (result, events)
        };

        self.emit(events).await;
        Some(result)
    }

    async fn raise_progress(&self, token: &AbortToken, value: u8) -> Option<()> {
        self.update(token, |state, events| raise_progress(state, events, value))
            .await
    }

    async fn emit(&self, events: Vec<WizardEvent>) {
        if events.is_empty() {
            return;
        }
        let listeners = self.listeners.read().await;
        for event in &events {
            for listener in listeners.iter() {
                listener(event);
            }
        }
    }

    /// Put every step from `index` onward back to pending and mark the run
    /// active under `generation`.
    fn rewind(&self, state: &mut RunState, index: usize, generation: u64) {
        for step in self.catalog.iter().skip(index) {
            state.reset_step(step.id);
        }
        state.is_running = true;
        state.failed_step = None;
        state.setup_complete = false;
        state.current_step_index = index;
        state.current_phase = self.catalog.step_at(index).map(|s| s.phase);
        state.abort_generation = generation;
        state.finished_at = None;
        if state.started_at.is_none() {
            state.started_at = Some(Utc::now());
        }
    }

    fn title_at(&self, index: usize) -> &'static str {
        self.catalog.step_at(index).map(|s| s.title).unwrap_or("step")
    }
}

fn set_status(
    state: &mut RunState,
    events: &mut Vec<WizardEvent>,
    index: usize,
    step_id: &str,
    status: StepStatus,
) -> WizardResult<()> {
    state.transition(step_id, status)?;
    events.push(WizardEvent::StepStatusChanged {
        step_id: step_id.to_string(),
        index,
        status,
    });
    Ok(())
}

fn push_log(
    state: &mut RunState,
    events: &mut Vec<WizardEvent>,
    level: LogLevel,
    message: impl Into<String>,
) {
    let entry = state.push_log(level, message);
    debug!(site_id = %state.site_id, level = ?entry.level, "{}", entry.message);
    events.push(WizardEvent::Log(entry));
}

fn raise_progress(state: &mut RunState, events: &mut Vec<WizardEvent>, value: u8) {
    if state.raise_progress(value) {
        events.push(WizardEvent::ProgressChanged {
            progress: state.progress,
        });
    }
}
