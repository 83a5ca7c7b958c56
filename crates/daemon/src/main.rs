//! Workqueue Daemon - Main Entry Point
//! A main queue driven on a blocking task, dispatching to worker threads

mod config;
mod service;

use anyhow::Result;
use config::{DaemonConfig, LogFormat};
use service::DemoService;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_logging(format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("workqueue=info"))?;

    match format {
        LogFormat::Json => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()?;
        }
        LogFormat::Pretty => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init()?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config = DaemonConfig::from_env()?;

    // 2. Initialize logging
    init_logging(config.log_format)?;
    info!("Workqueue daemon v{} starting...", VERSION);

    // 3. Wire queues and worker threads
    let service = DemoService::start(config.workers, config.heartbeat)?;

    // 4. Drive the main queue; its consumer blocks, so keep it off the runtime
    let consumer = {
        let main = service.main_queue().clone();
        tokio::task::spawn_blocking(move || main.run_until_close())
    };

    info!("System ready. Press Ctrl+C to shutdown");

    // 5. Wait for shutdown signal (or the configured run time)
    match config.run_for {
        Some(duration) => {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => signal?,
                _ = tokio::time::sleep(duration) => info!("Configured run time elapsed"),
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }

    info!("Shutdown signal received. Exiting gracefully...");

    // 6. Graceful shutdown: closing main lets its consumer drain and return
    service.main_queue().close();
    consumer.await?;
    service.shutdown()?;

    info!("Shutdown complete.");
    Ok(())
}
