//! Error types for the Seowiz core library.
//!
//! Every failure the orchestrator can surface is expressed as a
//! [`WizardError`]. Messages carry a stable code so log lines and the CLI
//! failure panel can be correlated.
//!
//! # Error Codes Reference
//!
//! | Code Range | Category | Description |
//! |------------|----------|-------------|
//! | E1001-E1099 | Config | Environment, config file, and validation errors |
//! | E2001-E2099 | Remote | HTTP calls to step endpoints and their responses |
//! | E3001-E3099 | Job | Background job failures and polling timeouts |
//! | E4001-E4099 | Run | Run lifecycle, step lookup, and status transitions |
//! | E9001-E9099 | General | Internal, IO, and serialization errors |

use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::state::StepStatus;

/// The main error type for the Seowiz core library.
#[derive(Debug, Error)]
pub enum WizardError {
    // ========================================================================
    // Configuration Errors (E1001-E1099)
    // ========================================================================
    #[error("[E1001] Missing required configuration: {0}")]
    MissingConfig(String),

    #[error("[E1002] Invalid configuration value for '{key}': {message}")]
    InvalidConfigValue { key: String, message: String },

    #[error("[E1003] Failed to parse configuration: {0}")]
    ConfigParseError(String),

    // ========================================================================
    // Remote Errors (E2001-E2099)
    // ========================================================================
    /// The endpoint answered with a non-success status. `message` is the
    /// server-provided error text when present, otherwise `HTTP <status>`.
    #[error("[E2001] {message}")]
    RemoteCallFailed {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    #[error("[E2002] Failed to parse response from '{endpoint}': {message}")]
    ResponseParseError { endpoint: String, message: String },

    #[error("[E2003] Remote service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("[E2004] Request timed out: {0}")]
    RequestTimeout(String),

    // ========================================================================
    // Job Errors (E3001-E3099)
    // ========================================================================
    /// The background job resolved to `failed`; `message` is passed through
    /// verbatim from the job record.
    #[error("[E3001] {message}")]
    JobFailed { step: String, message: String },

    #[error("[E3002] {title} timed out after {minutes} minutes")]
    JobTimeout {
        step: String,
        title: String,
        minutes: u64,
    },

    // ========================================================================
    // Run Errors (E4001-E4099)
    // ========================================================================
    #[error("[E4001] Step not found: {0}")]
    StepNotFound(String),

    #[error("[E4002] Invalid status transition for '{step}' from {from} to {to}")]
    InvalidStatusTransition {
        step: String,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("[E4003] No failed step to retry")]
    NothingToRetry,

    #[error("[E4004] Invalid step catalog: {0}")]
    InvalidCatalog(String),

    #[error("[E4005] No saved run for site '{0}'")]
    SnapshotNotFound(String),

    #[error("[E4006] Snapshot for site '{expected}' belongs to site '{found}'")]
    SnapshotMismatch { expected: String, found: String },

    // ========================================================================
    // General Errors (E9001-E9099)
    // ========================================================================
    #[error("[E9001] Internal error: {0}")]
    Internal(String),

    #[error("[E9002] IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("[E9003] Serialization error: {0}")]
    SerializationError(String),
}

/// Result type alias for Seowiz operations.
pub type WizardResult<T> = Result<T, WizardError>;

impl WizardError {
    pub fn remote(
        endpoint: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        WizardError::RemoteCallFailed {
            endpoint: endpoint.into(),
            status,
            message: message.into(),
        }
    }

    pub fn job_failed(step: impl Into<String>, message: impl Into<String>) -> Self {
        WizardError::JobFailed {
            step: step.into(),
            message: message.into(),
        }
    }

    /// The text shown to the user in the failure panel, without the code prefix.
    pub fn display_message(&self) -> String {
        match self {
            WizardError::RemoteCallFailed { message, .. } => message.clone(),
            WizardError::JobFailed { message, .. } => message.clone(),
            WizardError::JobTimeout { title, minutes, .. } => {
                format!("{} timed out after {} minutes", title, minutes)
            }
            other => {
                let full = other.to_string();
                match full.split_once("] ") {
                    Some((_, rest)) => rest.to_string(),
                    None => full,
                }
            }
        }
    }
}

impl From<reqwest::Error> for WizardError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| u.path().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        if err.is_timeout() {
            WizardError::RequestTimeout(endpoint)
        } else if err.is_connect() {
            WizardError::ServiceUnavailable(err.to_string())
        } else if err.is_decode() {
            WizardError::ResponseParseError {
                endpoint,
                message: err.to_string(),
            }
        } else {
            let status = err.status().map(|s| s.as_u16());
            WizardError::RemoteCallFailed {
                endpoint,
                status,
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for WizardError {
    fn from(err: serde_json::Error) -> Self {
        WizardError::SerializationError(err.to_string())
    }
}

impl From<config::ConfigError> for WizardError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => WizardError::MissingConfig(key),
            other => WizardError::ConfigParseError(other.to_string()),
        }
    }
}

// ============================================================================
// Error categorization helpers
// ============================================================================

impl WizardError {
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            WizardError::MissingConfig(_)
                | WizardError::InvalidConfigValue { .. }
                | WizardError::ConfigParseError(_)
        )
    }

    /// Returns true if the error came from talking to a remote step endpoint.
    pub fn is_remote_error(&self) -> bool {
        matches!(
            self,
            WizardError::RemoteCallFailed { .. }
                | WizardError::ResponseParseError { .. }
                | WizardError::ServiceUnavailable(_)
                | WizardError::RequestTimeout(_)
                | WizardError::JobFailed { .. }
                | WizardError::JobTimeout { .. }
        )
    }

    /// Returns true if a manual retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            WizardError::ServiceUnavailable(_)
            | WizardError::RequestTimeout(_)
            | WizardError::JobTimeout { .. } => true,
            WizardError::RemoteCallFailed {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            WizardError::MissingConfig(_) => "E1001",
            WizardError::InvalidConfigValue { .. } => "E1002",
            WizardError::ConfigParseError(_) => "E1003",
            WizardError::RemoteCallFailed { .. } => "E2001",
            WizardError::ResponseParseError { .. } => "E2002",
            WizardError::ServiceUnavailable(_) => "E2003",
            WizardError::RequestTimeout(_) => "E2004",
            WizardError::JobFailed { .. } => "E3001",
            WizardError::JobTimeout { .. } => "E3002",
            WizardError::StepNotFound(_) => "E4001",
            WizardError::InvalidStatusTransition { .. } => "E4002",
            WizardError::NothingToRetry => "E4003",
            WizardError::InvalidCatalog(_) => "E4004",
            WizardError::SnapshotNotFound(_) => "E4005",
            WizardError::SnapshotMismatch { .. } => "E4006",
            WizardError::Internal(_) => "E9001",
            WizardError::IoError(_) => "E9002",
            WizardError::SerializationError(_) => "E9003",
        }
    }

    pub fn user_suggestion(&self) -> Option<&'static str> {
        match self {
            WizardError::MissingConfig(_) => {
                Some("Set SEOWIZ_API_URL or add [api] base_url to seowiz.toml")
            }
            WizardError::InvalidConfigValue { .. } => {
                Some("Check the configuration file and SEOWIZ_* environment variables")
            }
            WizardError::ServiceUnavailable(_) => {
                Some("Check that the API base URL is reachable and try again")
            }
            WizardError::RequestTimeout(_) | WizardError::JobTimeout { .. } => {
                Some("The analysis may still be running server-side; retry this step later")
            }
            WizardError::RemoteCallFailed { status: Some(401), .. }
            | WizardError::RemoteCallFailed { status: Some(403), .. } => {
                Some("Verify SEOWIZ_API_KEY is set and valid for this site")
            }
            WizardError::NothingToRetry => {
                Some("Use 'seowiz restart' to start the setup from the beginning")
            }
            WizardError::SnapshotNotFound(_) => Some("Run 'seowiz run --site <id>' first"),
            WizardError::SnapshotMismatch { .. } => {
                Some("Remove the snapshot file or start a fresh run with 'seowiz run'")
            }
            _ => None,
        }
    }

    /// Log this error with appropriate severity level.
    pub fn log(&self) {
        let code = self.error_code();
        let suggestion = self.user_suggestion();

        if self.is_transient() {
            warn!(
                error_code = %code,
                suggestion = suggestion,
                "Transient error occurred: {}",
                self
            );
        } else {
            error!(
                error_code = %code,
                suggestion = suggestion,
                "Error occurred: {}",
                self
            );
        }
    }
}

// ============================================================================
// User-friendly error formatting for CLI
// ============================================================================

/// Format an error for CLI display with suggestions.
pub struct CliErrorDisplay<'a> {
    error: &'a WizardError,
    show_suggestion: bool,
}

impl<'a> CliErrorDisplay<'a> {
    pub fn new(error: &'a WizardError) -> Self {
        Self {
            error,
            show_suggestion: true,
        }
    }

    pub fn without_suggestion(mut self) -> Self {
        self.show_suggestion = false;
        self
    }
}

impl<'a> fmt::Display for CliErrorDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.error)?;

        if self.show_suggestion {
            if let Some(suggestion) = self.error.user_suggestion() {
                writeln!(f)?;
                writeln!(f, "  Suggestion: {}", suggestion)?;
            }
        }

        if self.error.is_transient() {
            writeln!(f)?;
            writeln!(f, "  This error may be temporary.")?;
        }

        Ok(())
    }
}
