//! `tracing` setup for embedders of the lowering core.
//!
//! Every event the core emits uses the `eh` target, so the default filter
//! only has to name that target. `EH_LOG` takes a full `EnvFilter`
//! directive and `EH_LOG_FORMAT` picks between text and JSON lines.

use std::fmt;
use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing::Dispatch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use crate::error::{Error, Result};

/// Output format for lowering log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(spec: &str) -> Option<Self> {
        match spec.to_ascii_lowercase().as_str() {
            "text" | "plain" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub format: LogFormat,
    /// `EnvFilter` directive, e.g. `eh=debug`.
    pub filter: String,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            filter: "eh=warn".into(),
        }
    }
}

impl LogOptions {
    /// Defaults overridden by `EH_LOG_FORMAT` and `EH_LOG` as returned by
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut options = Self::default();
        if let Some(value) = lookup("EH_LOG_FORMAT") {
            options.format = LogFormat::parse(&value).ok_or_else(|| {
                Error::config(format!("EH_LOG_FORMAT: unknown log format `{value}`"))
            })?;
        }
        if let Some(value) = lookup("EH_LOG") {
            options.filter = value;
        }
        Ok(options)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.filter)
            .map_err(|err| Error::config(format!("log filter `{}`: {err}", self.filter)))
    }
}

/// Builds a dispatcher writing lowering events to `writer`.
pub fn dispatcher<W>(options: &LogOptions, writer: W, ansi: bool) -> Result<Dispatch>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(options.env_filter()?)
        .with_writer(writer)
        .with_target(true)
        .with_level(true);
    let dispatch = match options.format {
        LogFormat::Json => Dispatch::new(builder.with_ansi(false).json().finish()),
        LogFormat::Text => Dispatch::new(builder.with_ansi(ansi).compact().finish()),
    };
    Ok(dispatch)
}

/// Installs the global dispatcher writing to stderr. Only the first call
/// installs anything; later calls still validate `options` and repeat its
/// outcome. Fails when the embedder already installed a global subscriber.
pub fn init_logging(options: &LogOptions) -> Result<()> {
    static INSTALLED: OnceLock<std::result::Result<(), String>> = OnceLock::new();

    let ansi = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
    let dispatch = dispatcher(options, std::io::stderr, ansi)?;
    INSTALLED
        .get_or_init(|| {
            tracing::dispatcher::set_global_default(dispatch).map_err(|err| err.to_string())
        })
        .clone()
        .map_err(|err| Error::config(format!("installing log dispatcher: {err}")))
}
