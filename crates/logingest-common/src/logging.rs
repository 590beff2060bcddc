//! Logging bootstrap
//!
//! Every binary in the workspace calls [`LogSettings::init`] once at startup.
//! Output always goes to stdout; when a log directory is configured a second,
//! ANSI-free copy is written to a daily rolling file.
//!
//! Use the `tracing` macros with structured fields rather than `println!`:
//!
//! ```rust
//! use tracing::{info, warn};
//!
//! let file_id = "3f2a";
//! info!(file_id, lines = 120, "Checkpoint written");
//! warn!(file_id, "Payload was not valid JSON");
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Default filter when neither `LOG_LEVEL` nor `LOG_FILTER` is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Output encoding for log records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON object per record
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow::anyhow!("Invalid log format: {}", other)),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Base level (`trace`..`error`)
    pub level: String,
    /// Extra per-target directives, e.g. `sqlx=warn,tower_http=debug`
    pub directives: Option<String>,
    pub format: LogFormat,
    /// Rolling file output is enabled when set
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl LogSettings {
    pub fn new(file_prefix: impl Into<String>) -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directives: None,
            format: LogFormat::Text,
            directory: None,
            file_prefix: file_prefix.into(),
        }
    }

    pub fn with_directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = Some(directives.into());
        self
    }

    /// Overlay `LOG_LEVEL`, `LOG_FILTER`, `LOG_FORMAT`, `LOG_DIR` and
    /// `LOG_FILE_PREFIX` from the environment.
    pub fn merge_env(mut self) -> Result<Self> {
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(filter) = std::env::var("LOG_FILTER") {
            self.directives = Some(filter);
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.format = format.parse()?;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.directory = Some(PathBuf::from(dir));
        }
        if let Ok(prefix) = std::env::var("LOG_FILE_PREFIX") {
            self.file_prefix = prefix;
        }
        Ok(self)
    }

    /// Full `EnvFilter` directive string: base level first, then overrides.
    pub fn filter_spec(&self) -> String {
        match self.directives.as_deref() {
            Some(extra) if !extra.trim().is_empty() => format!("{},{}", self.level, extra),
            _ => self.level.clone(),
        }
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(self.filter_spec()).context("Failed to parse log filter directives")
    }

    /// Install the global subscriber.
    ///
    /// The returned guard flushes the file writer on drop and must be held
    /// by `main` for the lifetime of the process.
    pub fn init(&self) -> Result<Option<WorkerGuard>> {
        let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

        let console = match self.format {
            LogFormat::Text => fmt::layer()
                .with_target(true)
                .with_filter(self.env_filter()?)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_filter(self.env_filter()?)
                .boxed(),
        };
        layers.push(console);

        let guard = match &self.directory {
            Some(dir) => {
                std::fs::create_dir_all(dir).context("Failed to create log directory")?;
                let appender = tracing_appender::rolling::daily(dir, &self.file_prefix);
                let (writer, guard) = tracing_appender::non_blocking(appender);

                let file = match self.format {
                    LogFormat::Text => fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_filter(self.env_filter()?)
                        .boxed(),
                    LogFormat::Json => fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_filter(self.env_filter()?)
                        .boxed(),
                };
                layers.push(file);
                Some(guard)
            },
            None => None,
        };

        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .context("Failed to install tracing subscriber")?;

        Ok(guard)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_filter_spec_combines_level_and_directives() {
        let settings = LogSettings::new("logingest").with_directives("sqlx=warn");
        assert_eq!(settings.filter_spec(), "info,sqlx=warn");

        let bare = LogSettings::new("logingest");
        assert_eq!(bare.filter_spec(), "info");
    }

    #[test]
    fn test_env_filter_rejects_garbage() {
        let mut settings = LogSettings::new("logingest");
        settings.level = "info".to_string();
        settings.directives = Some("sqlx=notalevel".to_string());
        assert!(settings.env_filter().is_err());
    }
}
