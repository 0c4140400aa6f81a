//! livesyncd - livesync runtime over JSON lines
//!
//! Runs the snapshot store and the remote view machinery without a
//! network listener. Messages are JSON objects of the form
//! `{"name": "...", "data": ...}`, one per line.
//!
//! # Usage
//!
//! ```bash
//! # Bridge stdin/stdout to the runtime (logs go to stderr)
//! livesyncd stdio
//!
//! # Apply a recorded session and print the resulting snapshot
//! livesyncd replay session.jsonl
//! ```
//!
//! A replay file may mix inbound messages and store actions:
//!
//! ```text
//! {"message": {"name": "editor-connect", "data": {"id": "st3", "files": ["/p/a.css"]}}}
//! {"action": {"family": "session", "action": {"type": "toggle-enabled", "id": "http://localhost/"}}}
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use livesync_core::Action;
use livesync_protocol::Envelope;
use livesyncd::{Engine, LocalTransport, Options};

/// livesync runtime
#[derive(Parser, Debug)]
#[command(name = "livesyncd", version, about)]
struct Args {
    /// Config file; defaults to <config dir>/livesync/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Exchange JSON-line messages over stdin and stdout
    Stdio,
    /// Apply a recorded JSON-lines file, then print the snapshot
    Replay {
        file: PathBuf,
        /// Quiet period before the snapshot is taken
        #[arg(long, default_value_t = 50)]
        settle_ms: u64,
    },
}

/// One replay line.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayLine {
    Message { message: Envelope },
    Action { action: Action },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("livesyncd=info".parse()?)
                .add_directive("livesync_core=info".parse()?)
                .add_directive("livesync_protocol=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let options = Options::discover(args.config.as_deref())?;

    match args.command.unwrap_or(Command::Stdio) {
        Command::Stdio => run_stdio(options).await,
        Command::Replay { file, settle_ms } => {
            replay(options, file, Duration::from_millis(settle_ms)).await
        }
    }
}

async fn run_stdio(options: Options) -> Result<()> {
    let transport = Arc::new(LocalTransport::new(options.event_buffer));
    let mut outgoing = transport.outgoing();
    let engine = Engine::start(transport.clone(), &options);
    let cancel = engine.cancel_token();

    let shutdown_token = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        loop {
            let envelope = tokio::select! {
                _ = writer_cancel.cancelled() => break,
                envelope = outgoing.recv() => match envelope {
                    Ok(envelope) => envelope,
                    Err(_) => break,
                },
            };
            let Ok(mut line) = serde_json::to_string(&envelope) else {
                continue;
            };
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line.context("reading stdin")?,
        };
        let Some(line) = line else {
            info!("stdin closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Envelope>(&line) {
            Ok(envelope) => transport.deliver(&envelope.name, envelope.data),
            Err(e) => warn!(error = %e, "ignoring malformed line"),
        }
    }

    cancel.cancel();
    let _ = writer.await;
    engine.shutdown().await;
    Ok(())
}

async fn replay(options: Options, file: PathBuf, settle: Duration) -> Result<()> {
    let text = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let transport = Arc::new(LocalTransport::new(options.event_buffer));
    let engine = Engine::start(transport.clone(), &options);

    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: ReplayLine = serde_json::from_str(line)
            .with_context(|| format!("{}:{}", file.display(), number + 1))?;
        match parsed {
            ReplayLine::Message { message } => {
                transport.deliver(&message.name, message.data);
                // Let the listener drain before the next line
                tokio::time::sleep(settle).await;
            }
            ReplayLine::Action { action } => {
                engine.store.dispatch(action).await?;
            }
        }
    }
    tokio::time::sleep(settle).await;

    let snapshot = engine.store.snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&*snapshot)?);

    engine.shutdown().await;
    Ok(())
}
