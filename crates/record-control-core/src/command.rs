//! Textual commands and the builder used to assemble them.
//!
//! A command is an action path (one or more whitespace-delimited tokens)
//! followed by zero or more `Key=Value` parameters:
//!
//! ```text
//! ProcessorCommunication RecordControl StartRecord PrependText=Session001
//! ```
//!
//! The wire format defines no escaping, so a value containing whitespace
//! cannot be represented. `CommandBuilder` rejects such values instead of
//! quoting them.

use std::{fmt, str::FromStr};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Command build error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Command is empty")]
    Empty,
    #[error("Invalid parameter key: {0:?}")]
    InvalidKey(String),
    #[error("Value for {key} contains whitespace and cannot be sent unescaped: {value:?}")]
    UnescapableValue { key: String, value: String },
}

/// An immutable textual command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Command {
    text: String,
}

impl Command {
    /// Parse a command from raw text.
    ///
    /// Surrounding whitespace is trimmed; the remaining text is kept verbatim.
    ///
    /// # Errors
    /// Returns `CommandError::Empty` if nothing but whitespace is given.
    pub fn parse(text: impl Into<String>) -> Result<Self, CommandError> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CommandError::Empty);
        }
        let text = if trimmed.len() == text.len() {
            text
        } else {
            trimmed.to_string()
        };
        Ok(Self { text })
    }

    /// The command text as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Request payload for this command.
    #[must_use]
    pub fn to_payload(&self) -> Bytes {
        Bytes::copy_from_slice(self.text.as_bytes())
    }

    /// Leading tokens that make up the action path.
    #[must_use]
    pub fn action(&self) -> Vec<&str> {
        self.text
            .split_whitespace()
            .take_while(|token| !token.contains('='))
            .collect()
    }

    /// `Key=Value` parameters in the order they appear.
    #[must_use]
    pub fn params(&self) -> Vec<(&str, &str)> {
        self.text
            .split_whitespace()
            .skip_while(|token| !token.contains('='))
            .filter_map(|token| token.split_once('='))
            .collect()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Command {
    type Error = CommandError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Command> for String {
    fn from(command: Command) -> Self {
        command.text
    }
}

/// Builder for constructing commands.
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    /// Action path tokens.
    pub action: Vec<String>,
    /// Parameters to append, in order.
    pub params: Vec<(String, String)>,
}

impl CommandBuilder {
    /// Create a new builder from an action path such as
    /// `"ProcessorCommunication RecordControl StartRecord"`.
    #[must_use]
    pub fn new(action: &str) -> Self {
        Self {
            action: action.split_whitespace().map(str::to_string).collect(),
            params: Vec::new(),
        }
    }

    /// Append one more action token.
    #[must_use]
    pub fn action<S: Into<String>>(mut self, token: S) -> Self {
        self.action.push(token.into());
        self
    }

    /// Append a `Key=Value` parameter.
    #[must_use]
    pub fn param<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Build the command.
    ///
    /// # Errors
    /// Returns error if the action is empty, a key is not a single token
    /// without `=`, or a value contains whitespace.
    pub fn build(&self) -> Result<Command, CommandError> {
        if self.action.iter().all(|token| token.trim().is_empty()) {
            return Err(CommandError::Empty);
        }

        let mut parts: Vec<String> = self
            .action
            .iter()
            .filter(|token| !token.trim().is_empty())
            .cloned()
            .collect();

        for (key, value) in &self.params {
            if key.is_empty() || key.contains('=') || key.contains(char::is_whitespace) {
                return Err(CommandError::InvalidKey(key.clone()));
            }
            if value.contains(char::is_whitespace) {
                return Err(CommandError::UnescapableValue {
                    key: key.clone(),
                    value: value.clone(),
                });
            }
            parts.push(format!("{key}={value}"));
        }

        Command::parse(parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_rejects_empty() {
        let cmd = Command::parse("  StopRecord \n").unwrap();
        assert_eq!(cmd.as_str(), "StopRecord");
        assert_eq!(Command::parse("   "), Err(CommandError::Empty));
    }

    #[test]
    fn test_action_and_params() {
        let cmd: Command = "ProcessorCommunication RecordControl StartRecord PrependText=Session001 AppendText=Condition001"
            .parse()
            .unwrap();
        assert_eq!(
            cmd.action(),
            vec!["ProcessorCommunication", "RecordControl", "StartRecord"]
        );
        assert_eq!(
            cmd.params(),
            vec![("PrependText", "Session001"), ("AppendText", "Condition001")]
        );
    }

    #[test]
    fn test_builder_joins_tokens() {
        let cmd = CommandBuilder::new("ProcessorCommunication RecordControl")
            .action("StartRecord")
            .param("CreateNewDateDirectory", 1)
            .build()
            .unwrap();
        assert_eq!(
            cmd.as_str(),
            "ProcessorCommunication RecordControl StartRecord CreateNewDateDirectory=1"
        );
    }

    #[test]
    fn test_builder_rejects_whitespace_in_value() {
        let err = CommandBuilder::new("StartRecord")
            .param("PrependText", "Session 001")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            CommandError::UnescapableValue {
                key: "PrependText".to_string(),
                value: "Session 001".to_string(),
            }
        );
    }

    #[test]
    fn test_builder_rejects_bad_keys() {
        for key in ["", "A=B", "Two Words"] {
            let err = CommandBuilder::new("StartRecord")
                .param(key, "x")
                .build()
                .unwrap_err();
            assert_eq!(err, CommandError::InvalidKey(key.to_string()));
        }
    }

    #[test]
    fn test_builder_requires_action() {
        assert_eq!(CommandBuilder::new("  ").build(), Err(CommandError::Empty));
    }

    #[test]
    fn test_serde_as_plain_string() {
        let cmd = Command::parse("StopRecord").unwrap();
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, "\"StopRecord\"");
        assert!(serde_json::from_str::<Command>("\"\"").is_err());
    }
}
