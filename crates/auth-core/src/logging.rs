//! `[log]` section of the gatekeep configuration
//!
//! ```toml
//! [log]
//! level = "info"
//! format = "json"
//! directives = ["gatekeep_auth_core::provider=debug", "sqlx=warn"]
//! ```
//!
//! `RUST_LOG`, when set, replaces `level` and `directives` entirely.

use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::{AuthError, Result};

/// Output format of the process-wide subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default verbosity: error, warn, info, debug, trace or off
    pub level: String,
    pub format: LogFormat,
    /// Extra `target=level` directives, e.g. to quiet a chatty backend
    pub directives: Vec<String>,
    /// Annotate events with source file and line
    pub file_info: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            directives: Vec::new(),
            file_info: false,
        }
    }
}

impl LogSettings {
    pub fn level_filter(&self) -> Result<LevelFilter> {
        self.level
            .parse()
            .map_err(|_| AuthError::Config(format!("Invalid log level: {}", self.level)))
    }

    /// Filter built from `RUST_LOG` when present, otherwise from this section
    pub fn env_filter(&self) -> Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }

        let mut filter = EnvFilter::default().add_directive(self.level_filter()?.into());
        for directive in &self.directives {
            let parsed: Directive = directive
                .parse()
                .map_err(|e| AuthError::Config(format!("Invalid log directive '{}': {}", directive, e)))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// Install the global subscriber described by `settings`.
///
/// Returns `Ok(false)` when the host application already installed one; the
/// existing subscriber is left in place.
pub fn init_logging(settings: &LogSettings) -> Result<bool> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(settings.env_filter()?)
        .with_file(settings.file_info)
        .with_line_number(settings.file_info);

    let installed = match settings.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    match installed {
        Ok(()) => {
            tracing::info!("gatekeep v{} logging at {}", env!("CARGO_PKG_VERSION"), settings.level);
            Ok(true)
        }
        Err(e) => {
            tracing::debug!("LOG: keeping existing subscriber ({})", e);
            Ok(false)
        }
    }
}
