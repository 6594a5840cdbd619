use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_chat_error::ClientError;
use agent_chat_stream_schema::{classify, Classification, OutboundRequest, StreamEvent};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::client::{ChatClient, ClientCommand, ClientInput};
use crate::config::ClientConfig;
use crate::sink::ChannelSink;
use crate::store::{InMemorySessionStore, StoredSession};

const INPUT_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "agent-chat", bin_name = "agent-chat")]
#[command(about = "Replay and inspect agent session streams", version)]
#[command(arg_required_else_help = true)]
pub struct AgentChatCli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Feed a JSON-lines stream through the client and print what it produced.
    Replay(ReplayArgs),
    /// Report how each record of a JSON-lines stream is classified.
    Classify(ClassifyArgs),
    /// Print the JSON schema of inbound events or outbound requests.
    Schema(SchemaArgs),
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Lines are stream events, or `{"command": ...}` user actions.
    file: PathBuf,

    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    #[arg(long, short = 'm')]
    model: Option<String>,

    /// Session to make visible before the first line.
    #[arg(long, short = 's')]
    session: Option<String>,
}

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    file: PathBuf,
}

#[derive(Args, Debug)]
pub struct SchemaArgs {
    #[arg(long)]
    requests: bool,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("invalid input on line {line}: {message}")]
    InvalidInput { line: usize, message: String },
    #[error("runtime error: {0}")]
    Runtime(String),
}

pub fn run_agent_chat() -> Result<(), CliError> {
    let cli = AgentChatCli::parse();
    if let Err(err) = init_logging() {
        eprintln!("failed to init logging: {err}");
        return Err(err);
    }
    run_command(&cli.command)
}

pub fn init_logging() -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_logfmt::builder()
                .layer()
                .with_writer(std::io::stderr),
        )
        .init();
    Ok(())
}

pub fn run_command(command: &Command) -> Result<(), CliError> {
    match command {
        Command::Replay(args) => run_replay(args),
        Command::Classify(args) => run_classify(args),
        Command::Schema(args) => run_schema(args),
    }
}

fn read_lines(path: &Path) -> Result<Vec<(usize, Value)>, CliError> {
    let contents = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let value = serde_json::from_str(line).map_err(|err| CliError::InvalidInput {
            line: index + 1,
            message: err.to_string(),
        })?;
        records.push((index + 1, value));
    }
    Ok(records)
}

fn parse_input(line: usize, value: Value) -> Result<ClientInput, CliError> {
    if value.get("command").is_none() {
        return Ok(ClientInput::Event(value));
    }
    let command = serde_json::from_value::<ClientCommand>(value).map_err(|err| {
        CliError::InvalidInput {
            line,
            message: err.to_string(),
        }
    })?;
    Ok(ClientInput::Command(command))
}

fn run_replay(args: &ReplayArgs) -> Result<(), CliError> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(model) = &args.model {
        config.model = model.clone();
    }

    let mut inputs = Vec::new();
    for (line, value) in read_lines(&args.file)? {
        inputs.push(parse_input(line, value)?);
    }

    let store = Arc::new(InMemorySessionStore::new());
    if let Some(session_id) = &args.session {
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|err| CliError::Runtime(err.to_string()))?;
        store.insert_messages(
            StoredSession {
                id: session_id.clone(),
                mode: config.default_mode,
                permission_mode: Default::default(),
                repo_ref: config.repo_ref.clone(),
                created_at,
            },
            Vec::new(),
        )?;
        inputs.insert(
            0,
            ClientInput::Command(ClientCommand::ActivateSession {
                session_id: session_id.clone(),
            }),
        );
    }

    let (sink, mut outbound) = ChannelSink::new();
    let mut client = ChatClient::new(config, store, Arc::new(sink));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Runtime(err.to_string()))?;

    runtime.block_on(async move {
        client.load_sessions().await?;
        let mut signals = client.subscribe_signals();
        let collector = tokio::spawn(async move {
            let mut collected = Vec::new();
            while let Some(signal) = signals.next().await {
                match signal {
                    Ok(signal) => collected.push(signal),
                    Err(err) => tracing::warn!(error = %err, "signal subscriber lagged"),
                }
            }
            collected
        });

        let (sender, receiver) = mpsc::channel(INPUT_CAPACITY);
        let driver = tokio::spawn(client.run(receiver));
        for input in inputs {
            if sender.send(input).await.is_err() {
                break;
            }
        }
        drop(sender);

        let client = driver
            .await
            .map_err(|err| CliError::Runtime(err.to_string()))?;
        let snapshot = client.reconciler().snapshot();
        drop(client);
        let signals = collector
            .await
            .map_err(|err| CliError::Runtime(err.to_string()))?;

        let mut requests: Vec<OutboundRequest> = Vec::new();
        while let Ok(request) = outbound.try_recv() {
            requests.push(request);
        }

        tracing::info!(
            signals = signals.len(),
            requests = requests.len(),
            "replay finished"
        );
        let report = json!({
            "signals": signals,
            "requests": requests,
            "snapshot": snapshot,
        });
        let mut stdout = std::io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, &report)?;
        writeln!(stdout)?;
        Ok::<(), CliError>(())
    })
}

fn run_classify(args: &ClassifyArgs) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    for (line, value) in read_lines(&args.file)? {
        let report = match classify(&value) {
            Classification::Event(event) => json!({
                "line": line,
                "kind": event.kind(),
                "status": "event",
                "sessionId": event.session_id(),
            }),
            Classification::Unknown { kind } => json!({
                "line": line,
                "kind": kind,
                "status": "unknown",
            }),
            Classification::Malformed { kind, reason } => json!({
                "line": line,
                "kind": kind,
                "status": "malformed",
                "reason": reason,
            }),
        };
        serde_json::to_writer(&mut stdout, &report)?;
        writeln!(stdout)?;
    }
    Ok(())
}

fn run_schema(args: &SchemaArgs) -> Result<(), CliError> {
    let schema = if args.requests {
        schemars::schema_for!(OutboundRequest)
    } else {
        schemars::schema_for!(StreamEvent)
    };
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &schema)?;
    writeln!(stdout)?;
    Ok(())
}
