//! Access to the container-orchestration tool that runs the backing stack.
//!
//! Everything the orchestrator does to the stack goes through
//! [`ComposeRunner`], so tests can substitute a scripted runner for the real
//! process.

mod process;

pub use process::ProcessCompose;

use crate::errors::StackResult;
use crate::events::EventChannel;
use async_trait::async_trait;
use futures::future::BoxFuture;

/// Operations on the backing stack.
///
/// Output-producing operations forward process output to the given channel as
/// it arrives.
#[async_trait]
pub trait ComposeRunner: Send + Sync {
    /// Starts every service in the background.
    async fn up(&self, output: &EventChannel) -> StackResult<()>;

    /// Stops and removes every service.
    async fn down(&self, output: &EventChannel) -> StackResult<()>;

    /// Returns the raw JSON status report of one service.
    async fn ps(&self, service: &str) -> StackResult<String>;

    /// Follows the combined logs of `services` until the process ends or
    /// `until` resolves.
    async fn follow_logs(
        &self,
        services: &[String],
        output: &EventChannel,
        until: BoxFuture<'_, ()>,
    ) -> StackResult<()>;

    /// Runs a command inside a running service.
    async fn exec(
        &self,
        service: &str,
        command: &[String],
        output: Option<&EventChannel>,
    ) -> StackResult<()>;
}

/// Argument lists for the compose subcommands.
pub struct ComposeArgs;

impl ComposeArgs {
    /// `compose up -d`
    #[must_use]
    pub fn up() -> Vec<String> {
        to_args(&["compose", "up", "-d"])
    }

    /// `compose down`
    #[must_use]
    pub fn down() -> Vec<String> {
        to_args(&["compose", "down"])
    }

    /// `compose ps --format json <service>`
    #[must_use]
    pub fn ps(service: &str) -> Vec<String> {
        to_args(&["compose", "ps", "--format", "json", service])
    }

    /// `compose logs --follow <services..>`
    #[must_use]
    pub fn logs(services: &[String]) -> Vec<String> {
        let mut args = to_args(&["compose", "logs", "--follow"]);
        args.extend(services.iter().cloned());
        args
    }

    /// `compose exec -T <service> <command..>`
    #[must_use]
    pub fn exec(service: &str, command: &[String]) -> Vec<String> {
        let mut args = to_args(&["compose", "exec", "-T", service]);
        args.extend(command.iter().cloned());
        args
    }
}

fn to_args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}
