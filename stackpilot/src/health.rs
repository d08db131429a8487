//! Health reports of the backing stack and the polling policy.

use crate::errors::{StackError, StackResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Health of the database service, derived from one status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The report carried no service entry (not created yet).
    Unknown,
    /// The service exists and is not healthy yet.
    Starting,
    /// The service reports healthy.
    Healthy,
    /// The service exists but is not running.
    Unreachable,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Starting => write!(f, "starting"),
            Self::Healthy => write!(f, "healthy"),
            Self::Unreachable => write!(f, "unreachable"),
        }
    }
}

impl HealthStatus {
    /// Parses the output of `compose ps --format json <service>`.
    ///
    /// Accepts a single object, one object per line, or an array. Output that
    /// is not JSON at all yields `Unknown`; malformed JSON is a health check
    /// fault.
    pub fn from_report(output: &str) -> StackResult<Self> {
        let trimmed = output.trim_start();
        let entry = if trimmed.starts_with('[') {
            let entries: Vec<serde_json::Value> = serde_json::from_str(trimmed.trim_end())
                .map_err(|e| StackError::HealthCheck(format!("invalid status report: {e}")))?;
            match entries.into_iter().next() {
                Some(entry) => entry,
                None => return Ok(Self::Unknown),
            }
        } else if trimmed.starts_with('{') {
            let first = trimmed.lines().next().unwrap_or_default();
            serde_json::from_str(first)
                .map_err(|e| StackError::HealthCheck(format!("invalid status report: {e}")))?
        } else {
            return Ok(Self::Unknown);
        };

        Ok(Self::from_entry(&entry))
    }

    fn from_entry(entry: &serde_json::Value) -> Self {
        let field = |name: &str| {
            entry
                .get(name)
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_ascii_lowercase()
        };

        if field("Health") == "healthy" {
            return Self::Healthy;
        }
        match field("State").as_str() {
            "exited" | "dead" | "removing" | "paused" => Self::Unreachable,
            _ => Self::Starting,
        }
    }

    /// Returns true if the status is recognized as a service state.
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Fixed-delay polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Maximum number of polls.
    pub max_attempts: usize,
    /// Delay after each poll.
    pub delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            delay: Duration::from_millis(3000),
        }
    }
}

impl PollPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_object() {
        let report = r#"{"Name":"stack-db-1","State":"running","Health":"healthy"}"#;
        assert_eq!(HealthStatus::from_report(report).unwrap(), HealthStatus::Healthy);

        let report = r#"{"Name":"stack-db-1","State":"running","Health":"starting"}"#;
        assert_eq!(HealthStatus::from_report(report).unwrap(), HealthStatus::Starting);
    }

    #[test]
    fn test_line_delimited_uses_first_entry() {
        let report = "{\"State\":\"running\",\"Health\":\"healthy\"}\n{\"State\":\"exited\"}\n";
        assert_eq!(HealthStatus::from_report(report).unwrap(), HealthStatus::Healthy);
    }

    #[test]
    fn test_array() {
        let report = r#"[{"State":"exited","Health":""}]"#;
        assert_eq!(HealthStatus::from_report(report).unwrap(), HealthStatus::Unreachable);
        assert_eq!(HealthStatus::from_report("[]").unwrap(), HealthStatus::Unknown);
    }

    #[test]
    fn test_non_json_is_unknown() {
        assert_eq!(HealthStatus::from_report("").unwrap(), HealthStatus::Unknown);
        assert_eq!(
            HealthStatus::from_report("no such service: db").unwrap(),
            HealthStatus::Unknown
        );
        assert!(!HealthStatus::Unknown.is_recognized());
    }

    #[test]
    fn test_malformed_json_is_fault() {
        let err = HealthStatus::from_report("{\"Health\": ").unwrap_err();
        assert!(matches!(err, StackError::HealthCheck(_)));
    }

    #[test]
    fn test_case_insensitive() {
        let report = r#"{"Health":"Healthy"}"#;
        assert_eq!(HealthStatus::from_report(report).unwrap(), HealthStatus::Healthy);
    }

    #[test]
    fn test_policy_default() {
        let policy = PollPolicy::default();
        assert_eq!(policy.max_attempts, 20);
        assert_eq!(policy.delay, Duration::from_millis(3000));
    }
}
