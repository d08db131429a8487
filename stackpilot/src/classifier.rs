//! Classification of low-level faults into benign noise and real faults.

use crate::config::{StackConfig, DEFAULT_EXECUTABLE};
use crate::errors::{ProcessFault, StackError};

/// Decides which faults are expected noise.
///
/// Benign faults are not logged. Two patterns qualify:
/// - a missing executable while the configured executable is an override of
///   the tooling default,
/// - a process fault reporting exit code zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorClassifier {
    executable_override: bool,
}

impl ErrorClassifier {
    /// Creates a classifier for the configured executable name.
    #[must_use]
    pub fn new(executable: &str) -> Self {
        Self {
            executable_override: executable != DEFAULT_EXECUTABLE,
        }
    }

    /// Creates a classifier from the stack configuration.
    #[must_use]
    pub fn from_config(config: &StackConfig) -> Self {
        Self {
            executable_override: config.uses_executable_override(),
        }
    }

    /// Returns true if `fault` is noise that must not be logged.
    #[must_use]
    pub fn is_benign(&self, fault: &StackError) -> bool {
        fault
            .as_process_fault()
            .is_some_and(|fault| self.is_benign_process_fault(fault))
    }

    /// Process-level variant of [`Self::is_benign`].
    #[must_use]
    pub fn is_benign_process_fault(&self, fault: &ProcessFault) -> bool {
        match fault {
            ProcessFault::NotFound { .. } => self.executable_override,
            other => other.exit_code() == Some(0),
        }
    }

    /// Logs `fault` at error level unless it is benign.
    ///
    /// Returns true if the fault was logged.
    pub fn log_unless_benign(&self, context: &str, fault: &StackError) -> bool {
        if self.is_benign(fault) {
            tracing::debug!(context, error = %fault, "Suppressed benign fault");
            false
        } else {
            tracing::error!(context, error = %fault, "Fault");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exited(code: i32) -> StackError {
        StackError::Process(ProcessFault::Exited {
            command: "podman compose up -d".into(),
            exit_code: code,
            stderr: "boom".into(),
        })
    }

    fn not_found(program: &str) -> StackError {
        StackError::Process(ProcessFault::NotFound {
            program: program.into(),
        })
    }

    #[test]
    fn test_exit_code_zero_is_always_benign() {
        for exe in ["docker", "podman", "nerdctl"] {
            assert!(ErrorClassifier::new(exe).is_benign(&exited(0)));
        }
    }

    #[test]
    fn test_non_zero_exit_is_never_benign() {
        for exe in ["docker", "podman"] {
            let classifier = ErrorClassifier::new(exe);
            for code in [1, 2, 125, 127, 255, -1] {
                assert!(!classifier.is_benign(&exited(code)), "{exe} {code}");
            }
        }
    }

    #[test]
    fn test_not_found_with_override_is_benign() {
        assert!(ErrorClassifier::new("podman").is_benign(&not_found("podman")));
        assert!(ErrorClassifier::new("podman").is_benign(&not_found("docker")));
    }

    #[test]
    fn test_not_found_with_default_executable_is_real() {
        assert!(!ErrorClassifier::new("docker").is_benign(&not_found("docker")));
    }

    #[test]
    fn test_from_config_follows_executable_override() {
        let config = StackConfig::new("/srv/stack");
        assert!(ErrorClassifier::from_config(&config).is_benign(&not_found("podman")));

        let config = config.with_executable("docker");
        assert!(!ErrorClassifier::from_config(&config).is_benign(&not_found("docker")));
    }

    #[test]
    fn test_other_faults_are_real() {
        let classifier = ErrorClassifier::new("podman");
        assert!(!classifier.is_benign(&StackError::HealthCheck("bad json".into())));
        assert!(!classifier.is_benign(&StackError::Configuration("missing".into())));
        assert!(!classifier.is_benign(&StackError::Process(ProcessFault::Terminated {
            command: "podman compose logs".into()
        })));
    }

    #[test]
    fn test_log_unless_benign() {
        let classifier = ErrorClassifier::new("podman");
        assert!(!classifier.log_unless_benign("stop", &not_found("podman")));
        assert!(classifier.log_unless_benign("stop", &exited(1)));
    }
}
