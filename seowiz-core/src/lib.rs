#![allow(
    clippy::needless_borrows_for_generic_args,
    clippy::derivable_impls,
    clippy::type_complexity,
    clippy::len_zero
)]

pub mod abort;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod orchestrator;
pub mod poll;
pub mod snapshot;
pub mod state;

pub use abort::{AbortController, AbortToken};
pub use catalog::{FailurePolicy, JobPolling, Phase, StepCatalog, StepDefinition};
pub use config::{
    get_config_dir, get_data_dir, ApiConfig, ConfigLoadError, LoggingConfig, PollingConfig,
    ProgressConfig, StorageConfig, WizardConfig,
};
pub use error::{CliErrorDisplay, WizardError, WizardResult};
pub use events::{EventListener, WizardEvent};
pub use executor::{
    extract_job_id, HttpStepExecutor, JobRecord, JobState, StepContext, StepExecutor, StepOutcome,
};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use poll::{poll_until, PollOptions, PollOutcome};
pub use snapshot::SnapshotStore;
pub use state::{percent_of, FailedStep, LogEntry, LogLevel, RunState, StepStatus};
