#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Typed lookups of environment variables.
//!
//! A variable that is unset, or set to an empty string, counts as missing.
//! A variable that is set but does not parse is an error rather than a
//! missing value.

use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptionEnvError {
    #[error("Invalid value for environment variable {name}: '{value}'")]
    Parse { name: String, value: String },
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|x| !x.trim().is_empty())
}

/// # Errors
///
/// * If the variable is set but fails to parse as `T`
pub fn option_env_parse<T: FromStr>(name: &str) -> Result<Option<T>, OptionEnvError> {
    var(name)
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| OptionEnvError::Parse {
                name: name.to_string(),
                value,
            })
        })
        .transpose()
}

/// # Errors
///
/// * If encounters an invalid digit in the variable's value
pub fn option_env_u16(name: &str) -> Result<Option<u16>, OptionEnvError> {
    option_env_parse(name)
}

#[must_use]
pub fn option_env(name: &str) -> Option<String> {
    var(name)
}
