use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Playbook or execution id does not resolve
    #[error("Not found: {0}")]
    NotFound(String),

    /// Execution requested against a disabled playbook
    #[error("Playbook disabled: {0}")]
    Disabled(String),

    /// A single step's action failed or exceeded its timeout
    #[error("Step failure: {0}")]
    StepFailure(#[from] StepFailure),

    /// Unexpected error inside the run loop itself
    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a single playbook step did not produce a result.
///
/// The `Display` form is the reason embedded in execution error messages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepFailure {
    #[error("{0}")]
    ActionFailed(String),

    #[error("timed out after {0}s")]
    Timeout(f64),

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("invalid timeout {0}")]
    InvalidTimeout(f64),
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Disabled(_) => "PLAYBOOK_DISABLED",
            AppError::StepFailure(_) => "STEP_FAILURE",
            AppError::ExecutionFailure(_) => "EXECUTION_FAILURE",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller was refused before any execution was created
    pub fn is_refusal(&self) -> bool {
        matches!(self, AppError::NotFound(_) | AppError::Disabled(_))
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from serde_yaml::Error
impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Conversion from prometheus::Error
impl From<prometheus::Error> for AppError {
    fn from(err: prometheus::Error) -> Self {
        AppError::Internal(format!("metrics: {}", err))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
