use anyhow::Context as _;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use stackpilot::config::StackConfig;
use stackpilot::errors::STATUS_OK;
use stackpilot::events::{sse, Frame};
use stackpilot::handler::{StackHandler, StackRequest};
use stackpilot::observability::init_tracing;
use stackpilot::pipeline::ProvisionRequest;
use std::collections::HashMap;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "stackpilot")]
#[command(version, about = "Start, stop and query an on-demand database and inference stack")]
struct Cli {
    /// Directory holding the stack's compose file (overrides `config_dir`).
    #[arg(short = 'C', long, value_name = "DIR", global = true)]
    config_dir: Option<PathBuf>,

    /// Container-orchestration executable (overrides `docker_exec`).
    #[arg(short, long, value_name = "NAME", global = true)]
    executable: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bring the stack up and wait for the database to report healthy.
    Start,
    /// Tear the stack down.
    Stop,
    /// Answer a query over a document with a model served by the stack.
    Run {
        /// Model to reserve.
        #[arg(short, long)]
        model: String,
        /// URL or inline text to ingest.
        #[arg(short, long)]
        source: String,
        /// Question to ask.
        #[arg(short, long)]
        query: String,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<StackConfig> {
    let mut vars: HashMap<String, String> = std::env::vars().collect();
    if let Some(dir) = &cli.config_dir {
        vars.insert("config_dir".into(), dir.display().to_string());
    }
    if let Some(exe) = &cli.executable {
        vars.insert("docker_exec".into(), exe.clone());
    }
    StackConfig::from_vars(&vars).context("loading stack configuration")
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(&cli)?;
    let request = match cli.command {
        Command::Start => StackRequest::Start,
        Command::Stop => StackRequest::Stop,
        Command::Run {
            model,
            source,
            query,
        } => StackRequest::Run(ProvisionRequest::new(model, &source, query)),
    };

    let handler = StackHandler::from_config(config);
    let mut dispatched = handler.dispatch(request);

    let mut stdout = std::io::stdout().lock();
    let mut status = None;
    while let Some(frame) = dispatched.stream.next().await {
        if let Frame::Commit { code, .. } = &frame {
            status = *code;
        }
        stdout.write_all(sse::encode(&frame).as_bytes())?;
        stdout.flush()?;
    }
    dispatched.task.await.context("request task failed")?;

    Ok(if status == Some(STATUS_OK) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
