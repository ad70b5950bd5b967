//! NeuroFlow - Main Entry Point
//!
//! Loads a graph description, builds the node graph and drives its root
//! generators until interrupted.

use anyhow::Context;
use clap::Parser;
use neuroflow_rs::{
    config::GraphConfig,
    pipeline::{Graph, NodeRegistry, Pipeline, StopReason},
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Graph description (TOML, or JSON with a .json extension)
    config: PathBuf,

    /// Stop after this many driver ticks
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Override the configured tick rate (0 = as fast as possible)
    #[arg(long)]
    tick_rate: Option<u32>,

    /// Also write daily-rolling log files to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Print the wired graph and exit
    #[arg(long)]
    describe: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    // Keeps the non-blocking file writer flushing until exit
    let _log_guard = init_logging(args.log_dir.as_deref());

    tracing::info!("Starting NeuroFlow with {:?}", args.config);

    let config = GraphConfig::load(&args.config)
        .with_context(|| format!("Failed to load {:?}", args.config))?;
    let graph = Graph::build(&config, &NodeRegistry::with_builtins())
        .context("Failed to build graph")?;

    if args.describe {
        println!("{}", graph.describe());
        return Ok(());
    }

    let mut pipeline = Pipeline::new(graph).with_max_ticks(args.max_ticks);
    if let Some(hz) = args.tick_rate {
        pipeline = pipeline.with_tick_rate(hz);
    }

    spawn_signal_listener(pipeline.stop_handle())?;

    let summary = pipeline.run()?;
    if !summary.failures.is_empty() {
        tracing::warn!("{} node failure(s) during run", summary.failures.len());
    }
    if let StopReason::Teardown { node, message } = summary.reason {
        anyhow::bail!("node '{}' failed: {}", node, message);
    }

    tracing::info!("Shutting down after {} ticks", summary.ticks);
    Ok(())
}

fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,neuroflow_rs=debug"))
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "neuroflow.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter()))
        .with(file_layer)
        .init();

    guard
}

/// Clear the running flag on SIGINT or SIGTERM so the driver disposes every
/// node before the process exits.
fn spawn_signal_listener(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create signal runtime")?;

    std::thread::Builder::new()
        .name("signal".into())
        .spawn(move || {
            runtime.block_on(async move {
                match wait_for_shutdown().await {
                    Ok(signal) => {
                        tracing::info!("Received {}, stopping pipeline", signal);
                        running.store(false, Ordering::SeqCst);
                    }
                    Err(e) => tracing::error!("Signal listener failed: {}", e),
                }
            });
        })
        .context("Failed to spawn signal thread")?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "Ctrl+C")
}
