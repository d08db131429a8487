//! A scripted [`ComposeRunner`] that records every call.

use crate::compose::ComposeRunner;
use crate::errors::{ProcessFault, StackResult};
use crate::events::EventChannel;
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

/// A call made against [`ScriptedCompose`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeCall {
    /// `compose up -d`
    Up,
    /// `compose down`
    Down,
    /// `compose ps` for a service.
    Ps(String),
    /// `compose logs --follow` for services.
    Logs(Vec<String>),
    /// `compose exec` in a service.
    Exec {
        /// Target service.
        service: String,
        /// Command run inside it.
        command: Vec<String>,
    },
}

impl ComposeCall {
    /// Returns true for an exec whose command has `word` in second position
    /// (e.g. `ollama pull <model>`).
    #[must_use]
    pub fn is_exec(&self, word: &str) -> bool {
        matches!(self, Self::Exec { command, .. } if command.get(1).map(String::as_str) == Some(word))
    }
}

/// Compose runner whose results are scripted up front.
///
/// Scripted failures are returned once; later calls succeed. Health reports
/// are consumed in order, then the default report (empty unless set) repeats.
#[derive(Debug, Default)]
pub struct ScriptedCompose {
    calls: Mutex<Vec<ComposeCall>>,
    up_fault: Mutex<Option<ProcessFault>>,
    down_fault: Mutex<Option<ProcessFault>>,
    logs_fault: Mutex<Option<ProcessFault>>,
    exec_faults: Mutex<HashMap<String, ProcessFault>>,
    exec_hangs: HashSet<String>,
    health: Mutex<VecDeque<StackResult<String>>>,
    default_health: String,
    log_lines: Vec<String>,
}

impl ScriptedCompose {
    /// Creates a runner where everything succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next `up`.
    #[must_use]
    pub fn with_up_result(self, result: Result<(), ProcessFault>) -> Self {
        *self.up_fault.lock() = result.err();
        self
    }

    /// Scripts the next `down`.
    #[must_use]
    pub fn with_down_result(self, result: Result<(), ProcessFault>) -> Self {
        *self.down_fault.lock() = result.err();
        self
    }

    /// Scripts the next `follow_logs`.
    #[must_use]
    pub fn with_logs_result(self, result: Result<(), ProcessFault>) -> Self {
        *self.logs_fault.lock() = result.err();
        self
    }

    /// Fails the next exec whose command's second word is `word`.
    #[must_use]
    pub fn with_exec_fault(self, word: impl Into<String>, fault: ProcessFault) -> Self {
        self.exec_faults.lock().insert(word.into(), fault);
        self
    }

    /// Makes every exec whose command's second word is `word` never finish.
    #[must_use]
    pub fn with_exec_hang(mut self, word: impl Into<String>) -> Self {
        self.exec_hangs.insert(word.into());
        self
    }

    /// Queues health reports returned by `ps`.
    #[must_use]
    pub fn with_health_reports(self, reports: Vec<StackResult<String>>) -> Self {
        self.health.lock().extend(reports);
        self
    }

    /// Sets the report returned once the queue is empty.
    #[must_use]
    pub fn with_default_health(mut self, report: impl Into<String>) -> Self {
        self.default_health = report.into();
        self
    }

    /// Lines written by `follow_logs` before it waits for release.
    #[must_use]
    pub fn with_log_lines(mut self, lines: Vec<String>) -> Self {
        self.log_lines = lines;
        self
    }

    /// Calls made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ComposeCall> {
        self.calls.lock().clone()
    }

    /// Number of calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&ComposeCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| predicate(*c)).count()
    }

    fn record(&self, call: ComposeCall) {
        self.calls.lock().push(call);
    }
}

fn scripted(slot: &Mutex<Option<ProcessFault>>) -> StackResult<()> {
    match slot.lock().take() {
        Some(fault) => Err(fault.into()),
        None => Ok(()),
    }
}

#[async_trait]
impl ComposeRunner for ScriptedCompose {
    async fn up(&self, _output: &EventChannel) -> StackResult<()> {
        self.record(ComposeCall::Up);
        scripted(&self.up_fault)
    }

    async fn down(&self, _output: &EventChannel) -> StackResult<()> {
        self.record(ComposeCall::Down);
        scripted(&self.down_fault)
    }

    async fn ps(&self, service: &str) -> StackResult<String> {
        self.record(ComposeCall::Ps(service.to_string()));
        let next = self.health.lock().pop_front();
        next.unwrap_or_else(|| Ok(self.default_health.clone()))
    }

    async fn follow_logs(
        &self,
        services: &[String],
        output: &EventChannel,
        until: BoxFuture<'_, ()>,
    ) -> StackResult<()> {
        self.record(ComposeCall::Logs(services.to_vec()));
        scripted(&self.logs_fault)?;
        for line in &self.log_lines {
            output.write_raw(line.clone());
        }
        until.await;
        Ok(())
    }

    async fn exec(
        &self,
        service: &str,
        command: &[String],
        _output: Option<&EventChannel>,
    ) -> StackResult<()> {
        let call = ComposeCall::Exec {
            service: service.to_string(),
            command: command.to_vec(),
        };
        let word = command.get(1).cloned().unwrap_or_default();
        self.record(call);

        if self.exec_hangs.contains(&word) {
            futures::future::pending::<()>().await;
        }
        let fault = self.exec_faults.lock().remove(&word);
        match fault {
            Some(fault) => Err(fault.into()),
            None => Ok(()),
        }
    }
}
