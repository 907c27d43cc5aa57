//! Connection and pacing configuration.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// Default controller host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default controller port.
pub const DEFAULT_PORT: u16 = 5556;

/// Default maximum wait for one reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default pause after a start command.
pub const DEFAULT_START_DELAY: Duration = Duration::from_secs(5);

/// Default pause after a stop command.
pub const DEFAULT_STOP_DELAY: Duration = Duration::from_secs(1);

/// Address of a remote controller plus the per-reply timeout.
///
/// Immutable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Remote host name or address.
    pub host: String,
    /// Remote TCP port.
    pub port: u16,
    /// Maximum wait for each reply.
    pub timeout: Duration,
}

impl Endpoint {
    /// Create an endpoint with the default timeout.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replace the reply timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `host:port` form accepted by socket connect calls.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}

/// Fixed delays between commands of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pacing {
    /// Pause after each start command's reply.
    pub start_delay: Duration,
    /// Pause after each stop command's reply.
    pub stop_delay: Duration,
}

impl Pacing {
    /// Create pacing with the given delays.
    #[must_use]
    pub const fn new(start_delay: Duration, stop_delay: Duration) -> Self {
        Self {
            start_delay,
            stop_delay,
        }
    }

    /// No pauses at all.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::new(DEFAULT_START_DELAY, DEFAULT_STOP_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_defaults() {
        let endpoint = Endpoint::default();
        assert_eq!(endpoint.address(), "127.0.0.1:5556");
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:5556");
        assert_eq!(endpoint.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_with_timeout() {
        let endpoint = Endpoint::new("rig-01", 6000).with_timeout(Duration::from_millis(250));
        assert_eq!(endpoint.address(), "rig-01:6000");
        assert_eq!(endpoint.timeout, Duration::from_millis(250));
    }
}
