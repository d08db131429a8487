//! Error types for stackpilot.
//!
//! The taxonomy follows the four fault families the orchestrator reports:
//! configuration, process, health check and pipeline faults. Request errors
//! are client mistakes caught before any side effect.

use std::fmt;
use thiserror::Error;

/// Status code committed on terminal success.
pub const STATUS_OK: u16 = 200;

/// Status code returned for malformed requests.
pub const STATUS_BAD_REQUEST: u16 = 400;

/// Status code committed on terminal faults.
pub const STATUS_SERVER_ERROR: u16 = 500;

/// The main error type for stackpilot operations.
#[derive(Debug, Error)]
pub enum StackError {
    /// A required configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The orchestration executable failed or is missing.
    #[error(transparent)]
    Process(#[from] ProcessFault),

    /// Polling the stack health failed to execute or parse.
    #[error("Health check failed: {0}")]
    HealthCheck(String),

    /// A provisioning pipeline step failed.
    #[error("Pipeline step '{step}' failed: {message}")]
    Pipeline {
        /// The step that failed.
        step: PipelineStep,
        /// What went wrong.
        message: String,
    },

    /// The request is malformed.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An HTTP call to the inference server or a document source failed.
    #[error("HTTP error: {0}")]
    Http(String),
}

impl StackError {
    /// Creates a pipeline error for the given step.
    #[must_use]
    pub fn pipeline(step: PipelineStep, message: impl Into<String>) -> Self {
        Self::Pipeline {
            step,
            message: message.into(),
        }
    }

    /// Returns the response status this error maps to.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Request(_) => STATUS_BAD_REQUEST,
            _ => STATUS_SERVER_ERROR,
        }
    }

    /// Returns the process fault wrapped by this error, if any.
    #[must_use]
    pub fn as_process_fault(&self) -> Option<&ProcessFault> {
        match self {
            Self::Process(fault) => Some(fault),
            _ => None,
        }
    }

    /// Re-labels the error as a failure of `step`, keeping its message.
    #[must_use]
    pub fn in_step(self, step: PipelineStep) -> Self {
        match self {
            Self::Pipeline { .. } => self,
            other => Self::pipeline(step, other.to_string()),
        }
    }
}

#[cfg(feature = "web")]
impl From<reqwest::Error> for StackError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// A failure of the container-orchestration executable.
#[derive(Debug, Error)]
pub enum ProcessFault {
    /// The executable could not be found on the system.
    #[error("Executable '{program}' not found")]
    NotFound {
        /// The program that was looked up.
        program: String,
    },

    /// The process ran and exited with a status the caller treats as failure.
    #[error("Command '{command}' exited with code {exit_code}: {stderr}")]
    Exited {
        /// The command line that ran.
        command: String,
        /// The reported exit code.
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// The process was killed by a signal and reported no exit code.
    #[error("Command '{command}' was terminated without an exit code")]
    Terminated {
        /// The command line that ran.
        command: String,
    },

    /// The process could not be spawned for a reason other than a missing binary.
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        /// The command line that was attempted.
        command: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ProcessFault {
    /// Builds a fault from a spawn error, separating missing executables.
    #[must_use]
    pub fn from_spawn(program: &str, command: String, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound {
                program: program.to_string(),
            }
        } else {
            Self::Spawn { command, source }
        }
    }

    /// Returns the exit code reported by the process, if it ran to completion.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exited { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

/// A client error in the request itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// A required form field is absent or empty.
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    /// The request method maps to no intent.
    #[error("Unsupported method '{0}'")]
    UnsupportedMethod(String),
}

/// The steps of the provisioning pipeline, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStep {
    /// Pulling the requested model.
    ReserveModel,
    /// Building the retrieval backend.
    BuildBackend,
    /// Ingesting the document source.
    LoadDocument,
    /// Asking the query.
    Query,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReserveModel => write!(f, "reserve_model"),
            Self::BuildBackend => write!(f, "build_backend"),
            Self::LoadDocument => write!(f, "load_document"),
            Self::Query => write!(f, "query"),
        }
    }
}

/// Result type alias for stackpilot operations.
pub type StackResult<T> = Result<T, StackError>;
