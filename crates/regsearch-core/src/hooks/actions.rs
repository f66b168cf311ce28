//! Side-effect capabilities exposed to hook templates

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace, warn};

/// Severity accepted by the `log` template function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(anyhow!("unknown log level '{}'", other)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// The fixed set of operations a hook template may invoke
///
/// Calls are synchronous. The hook engine serializes template evaluation,
/// so implementations are never entered concurrently by the engine.
pub trait HookActions: Send + Sync {
    /// Write a message to the service log
    fn log(&self, level: LogLevel, message: &str) -> Result<()>;

    /// Deliver a notification body to a URL
    fn notify(&self, url: &str, body: &str) -> Result<()>;
}

/// Logs through `tracing`; notifications are only logged, never sent
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActions;

impl HookActions for TracingActions {
    fn log(&self, level: LogLevel, message: &str) -> Result<()> {
        match level {
            LogLevel::Trace => trace!(target: "regsearch::hook", "{}", message),
            LogLevel::Debug => debug!(target: "regsearch::hook", "{}", message),
            LogLevel::Info => info!(target: "regsearch::hook", "{}", message),
            LogLevel::Warn => warn!(target: "regsearch::hook", "{}", message),
            LogLevel::Error => error!(target: "regsearch::hook", "{}", message),
        }
        Ok(())
    }

    fn notify(&self, url: &str, body: &str) -> Result<()> {
        info!(target: "regsearch::hook", "notify {} ({} bytes, not sent)", url, body.len());
        Ok(())
    }
}

/// Logs through `tracing` and POSTs notifications over HTTP
///
/// `notify` blocks on the given runtime handle, so hook evaluation must run
/// off the async worker threads (the notification processor uses
/// `spawn_blocking`).
#[derive(Debug, Clone)]
pub struct HttpActions {
    client: reqwest::Client,
    runtime: Handle,
}

impl HttpActions {
    /// Create HTTP actions bound to the current runtime
    pub fn new(runtime: Handle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("regsearch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client for hook notifications")?;
        Ok(Self { client, runtime })
    }
}

impl HookActions for HttpActions {
    fn log(&self, level: LogLevel, message: &str) -> Result<()> {
        TracingActions.log(level, message)
    }

    fn notify(&self, url: &str, body: &str) -> Result<()> {
        let url = url::Url::parse(url).with_context(|| format!("Invalid notification URL {}", url))?;
        debug!("Sending hook notification to {}", url);

        let request = self.client.post(url.clone()).body(body.to_string()).send();
        let response = self
            .runtime
            .block_on(request)
            .with_context(|| format!("Failed to send notification to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Notification to {} returned {}", url, status));
        }
        Ok(())
    }
}
