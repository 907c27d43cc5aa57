//! Configuration loading and layering.
//!
//! Sources, later overriding earlier: built-in defaults, the TOML file given
//! with `--config`, `RECORD_CONTROL_*` environment variables and command-line
//! flags. clap resolves the last two together, so a flag wins over its
//! environment variable.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Args;
use record_control_core::{
    Command, Endpoint, Pacing, Sequence,
    endpoint::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_START_DELAY, DEFAULT_STOP_DELAY, DEFAULT_TIMEOUT},
};
use record_control_session::plan::{self, RECORD_CONTROL};
use serde::{Deserialize, Serialize};

/// Settings for one `record-control` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlConfig {
    /// Controller host.
    pub host: String,
    /// Controller port.
    pub port: u16,
    /// Maximum wait for each reply, in milliseconds.
    pub timeout_ms: u64,
    /// Pause after each start command, in milliseconds.
    pub start_delay_ms: u64,
    /// Pause after each stop command, in milliseconds.
    pub stop_delay_ms: u64,
    /// Command sent after every start command.
    pub stop_command: String,
    /// Command sent once at the end of the sequence.
    pub shutdown_command: String,
    /// Recording directory for the default plan. Relative paths resolve
    /// against the working directory.
    pub recording_dir: PathBuf,
    /// Start commands. Empty means the default plan.
    pub commands: Vec<String>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout_ms: millis(DEFAULT_TIMEOUT),
            start_delay_ms: millis(DEFAULT_START_DELAY),
            stop_delay_ms: millis(DEFAULT_STOP_DELAY),
            stop_command: format!("{RECORD_CONTROL} StopRecord"),
            shutdown_command: format!("{RECORD_CONTROL} StopAcquisition"),
            recording_dir: PathBuf::from("Output_RecordControl"),
            commands: Vec::new(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Connection and pacing flags shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Controller host
    #[arg(long, global = true, env = "RECORD_CONTROL_HOST")]
    pub host: Option<String>,

    /// Controller port
    #[arg(long, global = true, env = "RECORD_CONTROL_PORT")]
    pub port: Option<u16>,

    /// Maximum wait for each reply, in milliseconds
    #[arg(long, global = true, env = "RECORD_CONTROL_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Pause after each start command, in milliseconds
    #[arg(long, global = true, env = "RECORD_CONTROL_START_DELAY_MS")]
    pub start_delay_ms: Option<u64>,

    /// Pause after each stop command, in milliseconds
    #[arg(long, global = true, env = "RECORD_CONTROL_STOP_DELAY_MS")]
    pub stop_delay_ms: Option<u64>,
}

/// Flags that shape the command sequence of `run`.
#[derive(Debug, Clone, Default, Args)]
pub struct SequenceOverrides {
    /// Start command; repeat for several pairs. Replaces the default plan
    #[arg(short = 'c', long = "command", value_name = "COMMAND")]
    pub commands: Vec<String>,

    /// Recording directory for the default plan
    #[arg(long, env = "RECORD_CONTROL_RECORDING_DIR")]
    pub recording_dir: Option<PathBuf>,

    /// Command sent after every start command
    #[arg(long)]
    pub stop_command: Option<String>,

    /// Command sent once at the end
    #[arg(long)]
    pub shutdown_command: Option<String>,
}

impl ControlConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string. Missing keys keep their
    /// defaults; unknown keys are rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply connection and pacing flags.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(host) = &overrides.host {
            self.host.clone_from(host);
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(timeout_ms) = overrides.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        if let Some(start_delay_ms) = overrides.start_delay_ms {
            self.start_delay_ms = start_delay_ms;
        }
        if let Some(stop_delay_ms) = overrides.stop_delay_ms {
            self.stop_delay_ms = stop_delay_ms;
        }
    }

    /// Apply sequence flags. Commands given on the command line replace
    /// the configured list rather than extending it.
    pub fn apply_sequence(&mut self, overrides: &SequenceOverrides) {
        if !overrides.commands.is_empty() {
            self.commands.clone_from(&overrides.commands);
        }
        if let Some(dir) = &overrides.recording_dir {
            self.recording_dir.clone_from(dir);
        }
        if let Some(stop) = &overrides.stop_command {
            self.stop_command.clone_from(stop);
        }
        if let Some(shutdown) = &overrides.shutdown_command {
            self.shutdown_command.clone_from(shutdown);
        }
    }

    /// Check connection settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` for an empty host, port 0 or a
    /// zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Validation("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Validation("port must not be 0".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
            .with_timeout(Duration::from_millis(self.timeout_ms))
    }

    #[must_use]
    pub const fn pacing(&self) -> Pacing {
        Pacing::new(
            Duration::from_millis(self.start_delay_ms),
            Duration::from_millis(self.stop_delay_ms),
        )
    }

    /// Build the command sequence: the configured start commands, or the
    /// default plan for `recording_dir` when none are given.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any command is empty or the
    /// recording directory cannot be expressed in a command.
    pub fn sequence(&self) -> Result<Sequence, ConfigError> {
        let starts = if self.commands.is_empty() {
            let dir = std::path::absolute(&self.recording_dir)?;
            plan::example_starts(&dir)
                .map_err(|e| ConfigError::Validation(format!("recording_dir: {e}")))?
        } else {
            self.commands
                .iter()
                .enumerate()
                .map(|(i, text)| parse_command(&format!("commands[{i}]"), text))
                .collect::<Result<Vec<_>, _>>()?
        };
        let stop = parse_command("stop_command", &self.stop_command)?;
        let shutdown = parse_command("shutdown_command", &self.shutdown_command)?;
        Ok(Sequence::from_starts(starts, &stop, shutdown))
    }
}

fn parse_command(field: &str, text: &str) -> Result<Command, ConfigError> {
    Command::parse(text).map_err(|e| ConfigError::Validation(format!("{field}: {e}")))
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
