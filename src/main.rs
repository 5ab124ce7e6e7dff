use agentdeck::replay::{ReplayScript, ReplayService};
use agentdeck::{config, OutputSyncEngine, SessionService, VtSink};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "agentdeck")]
#[command(version = "0.1.0")]
#[command(about = "Replay a scripted agent session through the output sync engine")]
struct Cli {
    /// Path to a JSON replay script
    script: PathBuf,

    /// Terminal rows for the vt100 sink
    #[arg(long, default_value_t = 24)]
    rows: u16,

    /// Terminal columns for the vt100 sink
    #[arg(long, default_value_t = 80)]
    cols: u16,

    /// Engine config file (JSON); falls back to the user config directory
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("agentdeck=info".parse()?)
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_from(path)?,
        None => config::load()?,
    };

    let script = ReplayScript::load(&cli.script)?;
    let service = ReplayService::new(&script.session);
    let sink = Arc::new(Mutex::new(VtSink::new(cli.rows, cli.cols, 2000)));

    let engine = OutputSyncEngine::spawn(
        Arc::clone(&service) as Arc<dyn SessionService>,
        Box::new(Arc::clone(&sink)),
        config.clone(),
    );

    info!(
        session = %service.session_id(),
        steps = script.steps.len(),
        "replaying script"
    );
    engine.bind(service.session_id(), script.session.status);
    service.drive(&script.steps).await;

    // Let trailing fetches and retries settle before reading the screen.
    let settle_ms =
        config.initializing_delay_ms + config.retry_base_ms * (config.max_retries as u64 + 1);
    tokio::time::sleep(Duration::from_millis(settle_ms)).await;

    let status = engine.status();
    engine.shutdown().await;

    if let Ok(sink) = sink.lock() {
        println!("{}", sink.screen_text());
    }

    if let Some(error) = status.error {
        anyhow::bail!("session load ended in error: {}", error);
    }
    Ok(())
}
