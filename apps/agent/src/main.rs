use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use channel_integration::PhoenixSocket;
use clap::Parser;
use client_core::{ExpressionInterpreter, Session, SessionEvent};
use dom::{MemoryDocument, PageFixture};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod settings;

use settings::{load_settings, AgentSettings};

/// Headless page that stays bridged to a controller and takes simulated UI
/// events on stdin.
#[derive(Parser, Debug)]
#[command(name = "drab-agent")]
struct Args {
    /// Settings file; defaults to `agent.toml` in the working directory.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    path: Option<String>,
    /// TOML page fixture with `[[element]]` tables.
    #[arg(long)]
    page: Option<PathBuf>,
}

impl Args {
    fn apply(self, settings: &mut AgentSettings) {
        if let Some(endpoint) = self.endpoint {
            settings.endpoint = endpoint;
        }
        if let Some(token) = self.token {
            settings.token = Some(token);
        }
        if let Some(path) = self.path {
            settings.path = path;
        }
        if let Some(page) = self.page {
            settings.page = Some(page);
        }
    }
}

fn load_page(path: &Path) -> Result<MemoryDocument> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read page fixture {}", path.display()))?;
    let fixture: PageFixture = toml::from_str(&raw)
        .with_context(|| format!("failed to parse page fixture {}", path.display()))?;
    Ok(MemoryDocument::from_fixture(&fixture))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut settings =
        load_settings(args.config.as_deref()).context("failed to load agent settings")?;
    args.apply(&mut settings);

    let document = Arc::new(match &settings.page {
        Some(path) => load_page(path)?,
        None => MemoryDocument::new(),
    });
    let phoenix = settings
        .phoenix_config()
        .with_context(|| format!("invalid endpoint {}", settings.endpoint))?;
    info!(
        endpoint = %settings.endpoint,
        path = %settings.path,
        elements = document.len(),
        "agent: starting"
    );

    let session = Session::new(
        settings.session_config(),
        document.clone(),
        Arc::new(PhoenixSocket::new(phoenix)),
        Arc::new(ExpressionInterpreter::new(document.clone())),
    );
    let mut session_events = session.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = session_events.recv().await {
            if let SessionEvent::StateChanged(state) = event {
                info!(?state, "agent: connection state changed");
            }
        }
    });

    session.start().await.context("failed to join the page channel")?;
    let supervisor = session.supervise()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match commands::parse(&line).and_then(|command| match command {
                    Some(command) => commands::apply(&document, &command).map(Some),
                    None => Ok(None),
                }) {
                    Ok(Some(output)) => println!("{output}"),
                    Ok(None) => {}
                    Err(err) => warn!(error = %err, "agent: command failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("agent: interrupted");
                break;
            }
        }
    }

    supervisor.abort();
    if let Err(err) = session.stop().await {
        warn!(error = %err, "agent: leave failed");
    }
    Ok(())
}
