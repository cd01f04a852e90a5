#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::fs::{File, OpenOptions};

use thiserror::Error;
use trivia_config::{AppType, make_logs_dir_path};
use trivia_env_utils::option_env;

#[cfg(feature = "macros")]
mod macros;

#[cfg(feature = "macros")]
pub use macros::*;

#[cfg(not(feature = "macros"))]
pub use log;

#[cfg(debug_assertions)]
const DEFAULT_LOG_LEVEL: &str = "trivia=trace";
#[cfg(not(debug_assertions))]
const DEFAULT_LOG_LEVEL: &str = "trivia=info";

#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    LogFile(#[from] std::io::Error),
    #[error(transparent)]
    SetLogger(#[from] log::SetLoggerError),
}

/// Picks the filter directive: `TRIVIA_LOG`, then `RUST_LOG`, then the
/// configured level, then the build default.
#[must_use]
pub fn env_filter(configured: Option<&str>) -> String {
    option_env("TRIVIA_LOG")
        .or_else(|| option_env("RUST_LOG"))
        .or_else(|| configured.map(ToString::to_string))
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

fn open_log_file(app_type: AppType, filename: &str) -> Result<Option<File>, InitError> {
    let Some(log_dir) = make_logs_dir_path(app_type) else {
        return Ok(None);
    };

    Ok(Some(
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(filename))?,
    ))
}

/// Initializes the global logger.
///
/// With a `filename`, output goes to that file inside the app's log
/// directory instead of stderr.
///
/// # Errors
///
/// * If the log file fails to open
/// * If a global logger was already installed
pub fn init(
    app_type: AppType,
    filename: Option<&str>,
    level: Option<&str>,
) -> Result<(), InitError> {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&env_filter(level));

    if let Some(filename) = filename {
        if let Some(file) = open_log_file(app_type, filename)? {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        } else {
            eprintln!("Could not get config dir to put the logs into");
        }
    }

    builder.try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn env_filter_uses_configured_level_without_env_override() {
        if option_env("TRIVIA_LOG").is_some() || option_env("RUST_LOG").is_some() {
            return;
        }

        assert_eq!(env_filter(Some("trivia=warn")), "trivia=warn");
        assert_eq!(env_filter(None), DEFAULT_LOG_LEVEL);
    }
}
