//! [`ComposeRunner`] backed by the real executable.

use super::{ComposeArgs, ComposeRunner};
use crate::config::StackConfig;
use crate::errors::{ProcessFault, StackResult};
use crate::events::EventChannel;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::debug;

/// Runs `<executable> compose ...` in the stack directory.
#[derive(Debug, Clone)]
pub struct ProcessCompose {
    executable: String,
    working_dir: PathBuf,
}

impl ProcessCompose {
    /// Creates a runner for the given executable and stack directory.
    #[must_use]
    pub fn new(executable: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            working_dir: working_dir.into(),
        }
    }

    /// Creates a runner from the stack configuration.
    #[must_use]
    pub fn from_config(config: &StackConfig) -> Self {
        Self::new(config.executable.clone(), config.working_dir.clone())
    }

    fn display(&self, args: &[String]) -> String {
        format!("{} {}", self.executable, args.join(" "))
    }

    fn spawn(&self, args: &[String]) -> Result<Child, ProcessFault> {
        debug!(command = %self.display(args), "Spawning");
        Command::new(&self.executable)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcessFault::from_spawn(&self.executable, self.display(args), e))
    }

    /// Runs to completion, forwarding output, and returns captured stdout.
    async fn run(&self, args: Vec<String>, output: Option<&EventChannel>) -> StackResult<String> {
        let mut child = self.spawn(&args)?;
        let (stdout, stderr) = tokio::join!(
            pump(child.stdout.take(), output, true),
            pump(child.stderr.take(), output, true)
        );
        let status = child.wait().await?;
        check_status(&self.display(&args), status, stderr?)?;
        Ok(stdout?)
    }
}

#[async_trait]
impl ComposeRunner for ProcessCompose {
    async fn up(&self, output: &EventChannel) -> StackResult<()> {
        self.run(ComposeArgs::up(), Some(output)).await.map(drop)
    }

    async fn down(&self, output: &EventChannel) -> StackResult<()> {
        self.run(ComposeArgs::down(), Some(output)).await.map(drop)
    }

    async fn ps(&self, service: &str) -> StackResult<String> {
        self.run(ComposeArgs::ps(service), None).await
    }

    async fn follow_logs(
        &self,
        services: &[String],
        output: &EventChannel,
        until: BoxFuture<'_, ()>,
    ) -> StackResult<()> {
        let args = ComposeArgs::logs(services);
        let mut child = self.spawn(&args)?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let follow = async {
            let (out, err) = tokio::join!(
                pump(stdout, Some(output), false),
                pump(stderr, Some(output), true)
            );
            out?;
            err
        };

        tokio::select! {
            pumped = follow => {
                let stderr = pumped?;
                let status = child.wait().await?;
                check_status(&self.display(&args), status, stderr)?;
            }
            () = until => {
                debug!(command = %self.display(&args), "Log follow released");
                child.kill().await?;
            }
        }
        Ok(())
    }

    async fn exec(
        &self,
        service: &str,
        command: &[String],
        output: Option<&EventChannel>,
    ) -> StackResult<()> {
        self.run(ComposeArgs::exec(service, command), output).await.map(drop)
    }
}

/// Forwards lines to `output`. Returns them too when `capture` is set.
async fn pump<R>(
    reader: Option<R>,
    output: Option<&EventChannel>,
    capture: bool,
) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut collected = String::new();
    let Some(reader) = reader else {
        return Ok(collected);
    };
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(channel) = output {
            channel.write_raw(format!("{line}\n"));
        }
        if capture {
            collected.push_str(&line);
            collected.push('\n');
        }
    }
    Ok(collected)
}

fn check_status(command: &str, status: ExitStatus, stderr: String) -> Result<(), ProcessFault> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(exit_code) => Err(ProcessFault::Exited {
            command: command.to_string(),
            exit_code,
            stderr: stderr.trim().to_string(),
        }),
        None => Err(ProcessFault::Terminated {
            command: command.to_string(),
        }),
    }
}
