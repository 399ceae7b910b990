//! Log output for the CLI
//!
//! Logs go to stderr so that command output on stdout stays clean.

use std::io;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration for the CLI
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    /// Enable JSON structured logging (vs plain text)
    pub json_format: bool,
    /// Environment filter (supports filters like "tideway=debug,sqlx=warn")
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            env_filter: Some("warn,tideway=info".to_string()),
        }
    }
}

impl LoggingConfig {
    /// Verbose configuration: debug output from tideway and sqlx statements
    pub fn verbose() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
            env_filter: Some("info,tideway=debug".to_string()),
        }
    }

    pub fn from_flags(verbose: bool, json_format: bool) -> Self {
        let config = if verbose { Self::verbose() } else { Self::default() };
        Self { json_format, ..config }
    }

    /// The filter used when `RUST_LOG` is not set
    pub fn filter(&self) -> &str {
        self.env_filter.as_deref().unwrap_or(&self.level)
    }
}

/// Initialize logging. `RUST_LOG` overrides the configured filter.
pub fn init_logging(config: LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(config.filter()))?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(io::stderr).json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(io::stderr).with_target(false))
            .try_init()?;
    }

    tracing::debug!(
        "Logging initialized (filter: {}, format: {})",
        config.filter(),
        if config.json_format { "JSON" } else { "text" }
    );
    Ok(())
}
