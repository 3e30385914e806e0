use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use waypoint::replay::{self, ReplayScript};
use waypoint::DelegateConfig;

fn main() -> Result<()> {
    let trace_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: waypoint <trace.yaml>")?;

    let subscriber_result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if subscriber_result.is_err() {
        // tracing was already initialised; continue silently
    }

    let config_path = std::env::var("WAYPOINT_CONFIG").ok().map(PathBuf::from);
    let config = DelegateConfig::load(config_path).unwrap_or_else(|err| {
        eprintln!("Failed to load delegate configuration: {err}. Using defaults.");
        DelegateConfig::default()
    });

    let script = ReplayScript::load(&trace_path)
        .with_context(|| format!("failed to load trace {}", trace_path.display()))?;

    // Responders are single-threaded; everything runs on this one thread.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    let records = rt.block_on(replay::run(&script, config))?;

    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }
    Ok(())
}
