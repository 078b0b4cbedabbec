// crates/server/src/main.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use taskdeck_core::llm::{ClaudeCliClassifier, IntentClassifier};
use taskdeck_db::Database;
use taskdeck_server::reaper::{self, ReaperConfig};
use taskdeck_server::state::AppState;
use taskdeck_server::watcher::{self, WatcherConfig};
use taskdeck_server::create_app;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "taskdeck", version, about = "Task lifecycle monitor for coding-agent sessions")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 7710)]
    port: u16,

    /// Database file path. Defaults to the platform data directory.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Root directory containing session transcript logs.
    #[arg(long)]
    transcript_root: Option<PathBuf>,

    /// Poll safety-net interval for transcript changes, in seconds.
    #[arg(long, default_value_t = 5)]
    poll_interval_secs: u64,

    /// Agents silent for this long are marked ended.
    #[arg(long, default_value_t = 1800)]
    reap_after_secs: u64,

    /// Reaper sweep interval, in seconds.
    #[arg(long, default_value_t = 60)]
    reap_interval_secs: u64,

    /// Model for advisory classification and task summaries. Without this
    /// flag both are disabled and the deterministic pipeline runs alone.
    #[arg(long)]
    model: Option<String>,
}

fn default_transcript_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join("projects"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("taskdeck=info,tower_http=warn")),
        )
        .init();

    let args = Args::parse();

    let db = match &args.db {
        Some(path) => Database::new(path).await?,
        None => Database::open_default().await?,
    };

    let classifier: Option<Arc<dyn IntentClassifier>> = args
        .model
        .as_deref()
        .map(|model| Arc::new(ClaudeCliClassifier::new(model)) as Arc<dyn IntentClassifier>);
    if let Some(model) = &args.model {
        tracing::info!(model = %model, "advisory classifier enabled");
    }

    let state = AppState::new(db, classifier);

    let transcript_root = args
        .transcript_root
        .clone()
        .or_else(default_transcript_root)
        .context("could not determine transcript root; pass --transcript-root")?;
    let _watcher = watcher::spawn(
        state.clone(),
        WatcherConfig {
            root: transcript_root,
            poll_interval: Duration::from_secs(args.poll_interval_secs),
        },
    );
    let _reaper = reaper::spawn(
        state.clone(),
        ReaperConfig {
            inactivity: Duration::from_secs(args.reap_after_secs),
            interval: Duration::from_secs(args.reap_interval_secs),
        },
    );

    let app = create_app(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
