use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AppType;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] json5::Error),
    #[error("Config directory not found")]
    ConfigDirNotFound,
}

/// Contents of `server/config.json5`. Every field is optional; command line
/// arguments and environment variables take precedence.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Path to a question bank replacing the built-in one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions_per_game: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Contents of `client/config.json5`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Websocket address prefilled in the connect form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Get the path to a config file, preferring .json5 but also checking .json
fn get_config_file_path(dir: &Path, filename: &str) -> Option<PathBuf> {
    let json5_path = dir.join(format!("{filename}.json5"));
    if json5_path.exists() {
        return Some(json5_path);
    }

    let json_path = dir.join(format!("{filename}.json"));
    if json_path.exists() {
        return Some(json_path);
    }

    None
}

/// Load a config file from disk, parsing it with json5
///
/// # Errors
///
/// * If the config file cannot be read
/// * If the config file is malformed
pub fn load_config_file<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = json5::from_str(&content)?;
    Ok(config)
}

fn load_app_config<T: for<'de> Deserialize<'de> + Default>(
    app_type: AppType,
) -> Result<T, ConfigError> {
    let config_dir =
        crate::get_app_config_dir_path(app_type).ok_or(ConfigError::ConfigDirNotFound)?;

    if let Some(path) = get_config_file_path(&config_dir, "config") {
        log::debug!("Loading {app_type} config from {}", path.display());
        load_config_file(&path)
    } else {
        Ok(T::default())
    }
}

/// Load the server configuration from the config directory
///
/// # Errors
///
/// * If the config directory cannot be found
/// * If the config file cannot be read
/// * If the config file is malformed
pub fn load_server_config() -> Result<ServerConfig, ConfigError> {
    load_app_config(AppType::Server)
}

/// Load the client configuration from the config directory
///
/// # Errors
///
/// * If the config directory cannot be found
/// * If the config file cannot be read
/// * If the config file is malformed
pub fn load_client_config() -> Result<ClientConfig, ConfigError> {
    load_app_config(AppType::Client)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    use super::*;

    #[test]
    fn test_parse_server_config_json5() {
        let json5_content = r#"{
            // Listen on every interface
            host: "0.0.0.0",
            port: 9000,
            questionsPerGame: 3,
            roundTimeoutSecs: 20,
            logging: {
                level: "debug",
            },
        }"#;

        let config: ServerConfig = json5::from_str(json5_content).unwrap();
        assert_eq!(config.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(config.port, Some(9000));
        assert_eq!(config.questions_per_game, Some(3));
        assert_eq!(config.round_timeout_secs, Some(20));
        assert_eq!(config.questions_file, None);
        assert_eq!(
            config.logging.unwrap().level.as_deref(),
            Some("debug")
        );
    }

    #[test]
    fn test_parse_client_config_json5() {
        let config: ClientConfig =
            json5::from_str(r#"{ address: "ws://quiz.local:8081/" }"#).unwrap();
        assert_eq!(config.address.as_deref(), Some("ws://quiz.local:8081/"));
    }

    #[test_log::test]
    #[serial]
    fn load_server_config_defaults_when_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        crate::set_root_dir(dir.path().to_path_buf());

        assert_eq!(load_server_config().unwrap(), ServerConfig::default());
    }

    #[test_log::test]
    #[serial]
    fn load_client_config_falls_back_to_json_extension() {
        let dir = tempfile::tempdir().unwrap();
        crate::set_root_dir(dir.path().to_path_buf());
        let client_dir = dir.path().join("client");
        fs::create_dir_all(&client_dir).unwrap();
        fs::write(
            client_dir.join("config.json"),
            r#"{"address": "ws://example.org/"}"#,
        )
        .unwrap();

        let config = load_client_config().unwrap();
        assert_eq!(config.address.as_deref(), Some("ws://example.org/"));
    }

    #[test_log::test]
    #[serial]
    fn load_server_config_reports_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        crate::set_root_dir(dir.path().to_path_buf());
        let server_dir = dir.path().join("server");
        fs::create_dir_all(&server_dir).unwrap();
        fs::write(server_dir.join("config.json5"), "{ port: ").unwrap();

        let result = load_server_config();
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
