//! Stack configuration, built once at the entry point and passed down.

use crate::errors::{StackError, StackResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Executable used when no override is configured.
pub const FALLBACK_EXECUTABLE: &str = "podman";

/// The executable name the orchestration tooling assumes by default.
pub const DEFAULT_EXECUTABLE: &str = "docker";

/// Configuration for the backing stack and the provisioning pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    /// Directory holding the stack definition (compose file).
    pub working_dir: PathBuf,
    /// Container-orchestration executable.
    pub executable: String,
    /// Delay between two health polls.
    #[serde(with = "duration_ms")]
    pub poll_delay: Duration,
    /// Attempts of the long-running health probe during start.
    pub start_probe_attempts: usize,
    /// Database service name in the stack definition.
    pub db_service: String,
    /// Inference service name in the stack definition.
    pub inference_service: String,
    /// Base URL of the inference server.
    pub inference_base_url: String,
    /// Keep-alive window passed when warming a model.
    pub keep_alive: String,
    /// Table name for vectors.
    pub vector_table: String,
}

impl StackConfig {
    /// Creates a configuration for the given stack directory with defaults.
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            executable: FALLBACK_EXECUTABLE.to_string(),
            poll_delay: Duration::from_millis(3000),
            start_probe_attempts: 20,
            db_service: "db".to_string(),
            inference_service: "ollama".to_string(),
            inference_base_url: "http://localhost:11434".to_string(),
            keep_alive: "10m".to_string(),
            vector_table: "vectorTab".to_string(),
        }
    }

    /// Builds the configuration from the process environment.
    pub fn from_env() -> StackResult<Self> {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Builds the configuration from a set of variables.
    ///
    /// `config_dir` is required; everything else falls back to defaults.
    pub fn from_vars(vars: &HashMap<String, String>) -> StackResult<Self> {
        let lookup = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| vars.get(*k))
                .map(|v| v.trim())
                .find(|v| !v.is_empty())
                .map(str::to_string)
        };

        let working_dir = lookup(&["config_dir", "STACKPILOT_CONFIG_DIR"])
            .ok_or_else(|| StackError::Configuration("config_dir must be specified".into()))?;

        let mut config = Self::new(working_dir);

        if let Some(exe) = lookup(&["docker_exec", "STACKPILOT_EXECUTABLE"]) {
            config.executable = exe;
        }
        if let Some(ms) = lookup(&["STACKPILOT_POLL_DELAY_MS"]) {
            let ms: u64 = ms.parse().map_err(|_| {
                StackError::Configuration(format!("invalid STACKPILOT_POLL_DELAY_MS: {ms}"))
            })?;
            config.poll_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = lookup(&["STACKPILOT_START_PROBE_ATTEMPTS"]) {
            config.start_probe_attempts = attempts.parse().map_err(|_| {
                StackError::Configuration(format!(
                    "invalid STACKPILOT_START_PROBE_ATTEMPTS: {attempts}"
                ))
            })?;
        }
        if let Some(url) = lookup(&["STACKPILOT_INFERENCE_URL"]) {
            config.inference_base_url = url;
        }
        if let Some(window) = lookup(&["STACKPILOT_KEEP_ALIVE"]) {
            config.keep_alive = window;
        }

        Ok(config)
    }

    /// Sets the executable.
    #[must_use]
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Sets the delay between health polls.
    #[must_use]
    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// Sets the attempts of the long-running start probe.
    #[must_use]
    pub fn with_start_probe_attempts(mut self, attempts: usize) -> Self {
        self.start_probe_attempts = attempts;
        self
    }

    /// Returns true if the executable differs from the tooling default.
    #[must_use]
    pub fn uses_executable_override(&self) -> bool {
        self.executable != DEFAULT_EXECUTABLE
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_missing_config_dir_is_configuration_error() {
        let err = StackConfig::from_vars(&HashMap::new()).unwrap_err();
        assert!(matches!(err, StackError::Configuration(_)));

        let err = StackConfig::from_vars(&vars(&[("config_dir", "  ")])).unwrap_err();
        assert!(matches!(err, StackError::Configuration(_)));
    }

    #[test]
    fn test_defaults() {
        let config = StackConfig::from_vars(&vars(&[("config_dir", "/srv/stack")])).unwrap();
        assert_eq!(config.working_dir, PathBuf::from("/srv/stack"));
        assert_eq!(config.executable, FALLBACK_EXECUTABLE);
        assert_eq!(config.poll_delay, Duration::from_millis(3000));
        assert_eq!(config.start_probe_attempts, 20);
        assert_eq!(config.keep_alive, "10m");
        assert!(config.uses_executable_override());
    }

    #[test]
    fn test_overrides() {
        let config = StackConfig::from_vars(&vars(&[
            ("config_dir", "/srv/stack"),
            ("docker_exec", "docker"),
            ("STACKPILOT_POLL_DELAY_MS", "10"),
            ("STACKPILOT_START_PROBE_ATTEMPTS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.executable, "docker");
        assert!(!config.uses_executable_override());
        assert_eq!(config.poll_delay, Duration::from_millis(10));
        assert_eq!(config.start_probe_attempts, 5);
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = StackConfig::from_vars(&vars(&[
            ("config_dir", "/srv/stack"),
            ("STACKPILOT_POLL_DELAY_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("STACKPILOT_POLL_DELAY_MS"));
    }

    #[test]
    fn test_serde_round_trip_keeps_delay() {
        let dir = tempfile::tempdir().unwrap();
        let config = StackConfig::new(dir.path()).with_poll_delay(Duration::from_millis(250));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"poll_delay\":250"));

        let back: StackConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.poll_delay, Duration::from_millis(250));
        assert_eq!(back.working_dir, dir.path());
    }
}
