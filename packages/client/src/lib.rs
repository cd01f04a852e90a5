#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Terminal client for the trivia game.
//!
//! * [`ws`] holds the websocket connection
//! * [`view`] turns server messages and key presses into what is on screen
//! * [`tui`] draws it and reads the keyboard

pub mod tui;
pub mod view;
pub mod ws;

pub const DEFAULT_ADDRESS: &str = "ws://localhost:8081/";

/// The address prefilled in the connect form: `cli`, then `TRIVIA_ADDRESS`,
/// then the config file, then [`DEFAULT_ADDRESS`].
#[must_use]
pub fn resolve_address(cli: Option<String>, config: Option<String>) -> String {
    cli.or_else(|| trivia_env_utils::option_env("TRIVIA_ADDRESS"))
        .or(config)
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    use super::*;

    #[test_log::test]
    #[serial]
    fn resolve_address_prefers_cli_then_env_then_config() {
        unsafe {
            std::env::remove_var("TRIVIA_ADDRESS");
        }
        assert_eq!(resolve_address(None, None), DEFAULT_ADDRESS);
        assert_eq!(
            resolve_address(None, Some("ws://config/".into())),
            "ws://config/"
        );

        unsafe {
            std::env::set_var("TRIVIA_ADDRESS", "ws://env/");
        }
        assert_eq!(
            resolve_address(None, Some("ws://config/".into())),
            "ws://env/"
        );
        assert_eq!(
            resolve_address(Some("ws://cli/".into()), Some("ws://config/".into())),
            "ws://cli/"
        );
        unsafe {
            std::env::remove_var("TRIVIA_ADDRESS");
        }
    }
}
