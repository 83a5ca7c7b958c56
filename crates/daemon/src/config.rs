//! Daemon configuration from environment variables
//!
//! - `WORKQUEUE_LOG_FORMAT`: `pretty` (default) or `json`
//! - `WORKQUEUE_WORKERS`: number of worker queues (default 2)
//! - `WORKQUEUE_HEARTBEAT_MS`: heartbeat interval on the main queue (default 1000)
//! - `WORKQUEUE_RUN_SECS`: stop after this many seconds; unset or 0 runs until Ctrl+C

use anyhow::{bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_WORKERS: usize = 2;
const DEFAULT_HEARTBEAT_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub log_format: LogFormat,
    pub workers: usize,
    pub heartbeat: Duration,
    pub run_for: Option<Duration>,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_format = match lookup("WORKQUEUE_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => bail!("WORKQUEUE_LOG_FORMAT must be 'pretty' or 'json', got {:?}", other),
        };

        let workers: usize = parse(&lookup, "WORKQUEUE_WORKERS")?.unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            bail!("WORKQUEUE_WORKERS must be at least 1");
        }

        let heartbeat_ms: u64 =
            parse(&lookup, "WORKQUEUE_HEARTBEAT_MS")?.unwrap_or(DEFAULT_HEARTBEAT_MS);
        if heartbeat_ms == 0 {
            bail!("WORKQUEUE_HEARTBEAT_MS must be greater than 0");
        }

        let run_for = match parse::<u64, _>(&lookup, "WORKQUEUE_RUN_SECS")? {
            None | Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            log_format,
            workers,
            heartbeat: Duration::from_millis(heartbeat_ms),
            run_for,
        })
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("invalid value for {key}"))
}
