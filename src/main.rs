//! # Agent Gateway
//!
//! Runs one reasoning session against the configured priority chains and
//! prints its event stream.
//!
//! ## Usage
//!
//! ```bash
//! # Ask the default (first) agent
//! agent-gateway --config gateway.yaml "What is the capital of France?"
//!
//! # Pick an agent, add a system instruction, print metrics afterwards
//! GATEWAY_CONFIG=gateway.yaml agent-gateway --agent research --system "Be brief." --metrics "..."
//!
//! # Read the prompt from stdin
//! echo "Summarize RFC 9110" | agent-gateway --config gateway.toml
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::StreamExt;
use gateway_agents::{Executor, NoTools, ProgressNotifier, SessionEvent};
use gateway_config::{load_config, ConfigSnapshot, LogFormat as ConfigLogFormat, CONFIG_PATH_ENV};
use gateway_core::{ChatMessage, RequestOptions, SessionId};
use gateway_resilience::{KeyManager, KeyManagerConfig};
use gateway_telemetry::{init_logging, GatewayMetrics, LogFormat, LoggingConfig, TracingAuditSink};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{error, info};

/// Writes progress messages to stderr
struct StderrNotifier;

#[async_trait::async_trait]
impl ProgressNotifier for StderrNotifier {
    async fn notify(&self, _session_id: &SessionId, message: &str) {
        eprintln!("... {message}");
    }
}

/// Agent gateway: run one reasoning session and stream its events
#[derive(Parser, Debug)]
#[command(name = "agent-gateway")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (YAML or TOML)
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: String,

    /// Agent name or alias (defaults to the first configured agent)
    #[arg(short, long)]
    agent: Option<String>,

    /// System instruction added ahead of the prompt
    #[arg(short, long)]
    system: Option<String>,

    /// Print Prometheus metrics to stderr when the session ends
    #[arg(long)]
    metrics: bool,

    /// Prompt words; read from stdin when omitted
    prompt: Vec<String>,
}

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Agent gateway failed");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    let args = Cli::parse();

    let path = args.config.clone();
    let config = load_config(&path)
        .await
        .with_context(|| format!("loading {path}"))?;

    let logging = LoggingConfig::new()
        .with_level(config.logging.level.clone())
        .with_format(match config.logging.format {
            ConfigLogFormat::Pretty => LogFormat::Pretty,
            ConfigLogFormat::Json => LogFormat::Json,
        });
    if let Err(e) = init_logging(&logging) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!(version = env!("CARGO_PKG_VERSION"), config = %path, "Starting agent gateway");

    let snapshot = Arc::new(ConfigSnapshot::load(config).await?);

    let keys = snapshot.keys();
    let key_manager = Arc::new(KeyManager::new(
        KeyManagerConfig::default()
            .with_quarantine_enabled(keys.quarantine_enabled)
            .with_quarantine_duration(keys.quarantine_duration)
            .with_sweep_interval(keys.sweep_interval),
        snapshot.credentials().clone(),
    ));
    let _sweeper = key_manager.spawn_quarantine_sweeper();
    let metrics = GatewayMetrics::new()?;

    let executor = Executor::builder(Arc::clone(&snapshot))
        .credential_broker(key_manager.clone())
        .tools(Arc::new(NoTools))
        .audit_sink(Arc::new(TracingAuditSink))
        .notifier(Arc::new(StderrNotifier))
        .metrics(metrics.clone())
        .build()?;

    let agent = match args.agent.clone() {
        Some(agent) => agent,
        None => snapshot
            .agents()
            .first()
            .map(|a| a.name.clone())
            .context("configuration defines no agents")?,
    };

    let prompt = if args.prompt.is_empty() {
        let mut input = String::new();
        tokio::io::stdin()
            .read_to_string(&mut input)
            .await
            .context("reading prompt from stdin")?;
        input
    } else {
        args.prompt.join(" ")
    };
    if prompt.trim().is_empty() {
        bail!("empty prompt");
    }

    let mut history = Vec::new();
    if let Some(system) = &args.system {
        history.push(ChatMessage::system(system.clone()));
    }
    history.push(ChatMessage::user(prompt.trim()));

    let mut handle = executor.start_session(&agent, history, RequestOptions::new())?;
    let mut stdout = tokio::io::stdout();
    let mut failed = false;

    loop {
        let event = tokio::select! {
            event = handle.next() => event,
            _ = tokio::signal::ctrl_c() => {
                info!(session_id = %handle.id(), "Interrupted, cancelling session");
                handle.cancel();
                continue;
            }
        };
        let Some(event) = event else { break };

        let line = match &event {
            SessionEvent::Thought { step, text } => format!("[{step}] thought: {text}\n"),
            SessionEvent::Observation {
                step,
                tool,
                content,
                ..
            } => format!("[{step}] {tool} -> {content}\n"),
            SessionEvent::Final { text } => format!("{text}\n"),
            SessionEvent::Failed(failure) => {
                failed = true;
                format!("failed: {failure}\n")
            }
        };
        stdout.write_all(line.as_bytes()).await?;
        if event.is_terminal() {
            break;
        }
    }
    stdout.flush().await?;

    if args.metrics {
        for (provider, status) in key_manager.status() {
            metrics.set_key_pool(&provider, "available", status.available);
            metrics.set_key_pool(&provider, "quarantined", status.quarantined);
            metrics.set_key_pool(&provider, "retired", status.retired);
            metrics.set_key_pool(&provider, "leased", status.leased);
        }
        eprint!("{}", metrics.render()?);
    }

    if failed {
        bail!("session failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parses_flags_and_prompt() {
        let cli = Cli::try_parse_from([
            "agent-gateway",
            "--config=gw.yaml",
            "-a",
            "research",
            "--metrics",
            "what",
            "is",
            "rust?",
        ])
        .expect("parse");
        assert_eq!(cli.config, "gw.yaml");
        assert_eq!(cli.agent.as_deref(), Some("research"));
        assert!(cli.metrics);
        assert_eq!(cli.prompt.join(" "), "what is rust?");
    }

    #[test]
    fn test_cli_prompt_may_be_omitted() {
        let cli = Cli::try_parse_from(["agent-gateway", "-c", "gw.toml", "-s", "Be brief."]).expect("parse");
        assert_eq!(cli.system.as_deref(), Some("Be brief."));
        assert!(cli.prompt.is_empty());
    }
}
