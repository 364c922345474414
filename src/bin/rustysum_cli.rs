//! Command-line entrypoint.
//!
//! Runs one pipeline over a UTF-8 text file (or stdin) and prints the protocol lines to
//! stdout as they are produced. Logs go to stderr and the log file, never to stdout, so the
//! output can be piped straight into a protocol consumer.
use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use rustysum::{
    config, logging,
    processing::{PipelineEvent, PipelineResult, SummarizationService},
    protocol,
};

#[derive(Parser)]
#[command(
    name = "rustysum-cli",
    about = "Summarize long documents with a streaming map-reduce pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize a text file and stream PROGRESS/SUMMARY/ERROR lines.
    Summarize {
        /// Backend identifier (see `backends`).
        #[arg(long, default_value = "bart-large-cnn")]
        backend: String,
        /// UTF-8 text file to summarize; `-` reads stdin.
        #[arg(long)]
        input: PathBuf,
    },
    /// List selectable backends and their token budgets.
    Backends {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_tracing_with(std::io::stderr).context("failed to install tracing subscriber")?;
    let service = SummarizationService::new(Arc::new(config::get_config().clone()));

    match cli.command {
        Command::Summarize { backend, input } => summarize(&service, &backend, &input).await,
        Command::Backends { json } => list_backends(&service, json),
    }
}

async fn summarize(service: &SummarizationService, backend: &str, input: &Path) -> Result<()> {
    let text = read_input(input)?;
    let mut events = service.summarize(text, backend.to_string());
    let mut stdout = std::io::stdout();
    let mut failed = false;

    while let Some(event) = events.next().await {
        let event = event.context("summarization aborted")?;
        if matches!(
            event,
            PipelineEvent::Finished(PipelineResult::Failure { .. })
        ) {
            failed = true;
        }
        stdout
            .write_all(protocol::encode(&event).as_bytes())
            .and_then(|()| stdout.flush())
            .context("failed to write to stdout")?;
    }

    if failed {
        bail!("pipeline finished with an error");
    }
    Ok(())
}

fn read_input(input: &Path) -> Result<String> {
    if input.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(input)
        .with_context(|| format!("failed to read input text at {}", input.display()))
}

fn list_backends(service: &SummarizationService, json: bool) -> Result<()> {
    let backends = service.backends();
    if json {
        let rendered =
            serde_json::to_string_pretty(&backends).context("failed to serialize backends")?;
        println!("{rendered}");
        return Ok(());
    }

    println!(
        "{:<16} {:>10} {:>8}  codec",
        "backend", "max_tokens", "overlap"
    );
    for profile in backends {
        println!(
            "{:<16} {:>10} {:>8}  {}",
            profile.id,
            profile.budget.max_tokens(),
            profile.budget.overlap_tokens(),
            profile.tokenizer.unwrap_or("heuristic")
        );
    }
    Ok(())
}
