#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Configuration directory layout for the trivia server and client.
//!
//! Everything lives under `~/.local/trivia` unless the root is overridden with
//! [`set_root_dir`]. Each application gets its own subdirectory holding its
//! `config.json5` and, for the client, its log files.

use std::{
    path::PathBuf,
    sync::{LazyLock, Mutex},
};

#[cfg(feature = "file")]
pub mod file;

/// Represents the type of trivia application.
///
/// Used to determine the appropriate configuration directory.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AppType {
    /// Websocket game server
    Server,
    /// Terminal client
    Client,
}

impl From<AppType> for &str {
    fn from(value: AppType) -> Self {
        match value {
            AppType::Server => "server",
            AppType::Client => "client",
        }
    }
}

impl std::fmt::Display for AppType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).into())
    }
}

static ROOT_DIR: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

/// Sets the root directory for trivia configuration.
///
/// By default, the root directory is `~/.local/trivia`.
///
/// # Panics
///
/// * If the `ROOT_DIR` `Mutex` is poisoned
pub fn set_root_dir(path: PathBuf) {
    *ROOT_DIR.lock().unwrap() = Some(path);
}

#[must_use]
fn get_root_dir() -> Option<PathBuf> {
    let mut root_dir = ROOT_DIR.lock().unwrap();

    if root_dir.is_some() {
        return root_dir.clone();
    }

    *root_dir = home::home_dir().map(|home| home.join(".local").join("trivia"));

    root_dir.clone()
}

/// Returns the path to the trivia configuration directory.
#[must_use]
pub fn get_config_dir_path() -> Option<PathBuf> {
    get_root_dir()
}

/// Returns the path to the application-specific configuration directory.
///
/// For example, for `AppType::Server`, this returns `~/.local/trivia/server`.
#[must_use]
pub fn get_app_config_dir_path(app_type: AppType) -> Option<PathBuf> {
    get_config_dir_path().map(|x| x.join(app_type.to_string()))
}

/// Returns the application's configuration directory, creating it if it
/// doesn't exist.
///
/// Returns `None` if the directory cannot be created or the path cannot be
/// determined.
#[must_use]
pub fn make_app_config_dir_path(app_type: AppType) -> Option<PathBuf> {
    if let Some(path) = get_app_config_dir_path(app_type)
        && (path.is_dir() || std::fs::create_dir_all(&path).is_ok())
    {
        return Some(path);
    }

    None
}

/// Returns the application's log directory, creating it if it doesn't exist.
#[must_use]
pub fn make_logs_dir_path(app_type: AppType) -> Option<PathBuf> {
    let path = get_app_config_dir_path(app_type)?.join("logs");

    if path.is_dir() || std::fs::create_dir_all(&path).is_ok() {
        Some(path)
    } else {
        log::warn!("Failed to create logs dir {}", path.display());
        None
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    use super::*;

    #[test_log::test]
    #[serial]
    fn app_config_dir_is_under_root() {
        let dir = tempfile::tempdir().unwrap();
        set_root_dir(dir.path().to_path_buf());

        assert_eq!(
            get_app_config_dir_path(AppType::Server),
            Some(dir.path().join("server"))
        );
        assert_eq!(
            get_app_config_dir_path(AppType::Client),
            Some(dir.path().join("client"))
        );
    }

    #[test_log::test]
    #[serial]
    fn make_logs_dir_path_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        set_root_dir(dir.path().to_path_buf());

        let logs = make_logs_dir_path(AppType::Client).unwrap();

        assert_eq!(logs, dir.path().join("client").join("logs"));
        assert!(logs.is_dir());
    }
}
