//! Unified error types for the tailtray-core library.
//!
//! Uses SNAFU for context-rich error handling, especially useful when the same
//! underlying error type (like `std::io::Error`) appears in different contexts.

use snafu::{ResultExt, Snafu};
use std::path::PathBuf;

use crate::command::CommandKind;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all core library operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Failed to spawn the external binary.
    #[snafu(display("failed to execute command '{command}'"))]
    CommandExecution {
        command: String,
        source: std::io::Error,
    },

    /// A command was requested while another one was still running.
    ///
    /// This is a caller bug: two children writing to the same pipes would
    /// corrupt the output that gets parsed.
    #[snafu(display("cannot run {requested:?} while {running:?} is still in flight"))]
    CommandInFlight {
        running: CommandKind,
        requested: CommandKind,
    },

    /// `status --json` did not produce valid JSON.
    #[snafu(display("failed to parse status output"))]
    StatusParse { source: serde_json::Error },

    /// `status --json` produced JSON that is not an object.
    #[snafu(display("status output is a JSON {found}, expected an object"))]
    StatusShape { found: String },

    /// Settings file exists but cannot be read.
    #[snafu(display("failed to read settings at {}", path.display()))]
    SettingsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Settings file is not valid TOML for [`crate::settings::Settings`].
    #[snafu(display("failed to parse settings at {}", path.display()))]
    SettingsParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Extension trait for adding context to io::Error results.
pub trait IoResultExt<T> {
    /// Add context for command execution errors.
    fn command_context(self, command: impl Into<String>) -> Result<T>;

    /// Add context for settings read errors.
    fn settings_read_context(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn command_context(self, command: impl Into<String>) -> Result<T> {
        self.context(CommandExecutionSnafu {
            command: command.into(),
        })
    }

    fn settings_read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(SettingsReadSnafu { path: path.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_message_names_both_commands() {
        let err = Error::CommandInFlight {
            running: CommandKind::Status,
            requested: CommandKind::Connect,
        };
        let message = err.to_string();
        assert!(message.contains("Status"));
        assert!(message.contains("Connect"));
    }

    #[test]
    fn test_command_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        ));
        let err = result.command_context("tailscale status --json").unwrap_err();
        assert!(matches!(err, Error::CommandExecution { ref command, .. } if command == "tailscale status --json"));
    }
}
