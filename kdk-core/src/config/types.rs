//! Link configuration type definitions

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default inter-byte timeout in milliseconds
pub const DEFAULT_BYTE_TIMEOUT_MS: u32 = kdk_protocol::receiver::DEFAULT_BYTE_TIMEOUT_MS;

/// Default response timeout in milliseconds
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u32 = 500;

/// Default number of retransmissions before a resync
pub const DEFAULT_MAX_RETRIES: u8 = 5;

/// Default steady-state poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 15_000;

/// Default time to wait for the controller's resync marker after start-up
pub const DEFAULT_WAIT_SYNC_TIMEOUT_MS: u32 = 10_000;

/// Timing configuration for the controller link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LinkConfig {
    /// Partial frames are dropped after this much line silence
    pub byte_timeout_ms: u32,
    /// Time to wait for a response before retransmitting
    pub receive_timeout_ms: u32,
    /// Retransmissions of one request before forcing a resync
    pub max_retries: u8,
    /// Interval between steady-state parameter reads
    pub poll_interval_ms: u32,
    /// How long to wait for a resync marker before waking the controller
    pub wait_sync_timeout_ms: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            byte_timeout_ms: DEFAULT_BYTE_TIMEOUT_MS,
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            wait_sync_timeout_ms: DEFAULT_WAIT_SYNC_TIMEOUT_MS,
        }
    }
}

impl LinkConfig {
    /// Check the timing values for consistency
    ///
    /// The response timeout must exceed the inter-byte timeout, otherwise
    /// a slow but valid response would be retransmitted over.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.byte_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.receive_timeout_ms <= self.byte_timeout_ms {
            return Err(ConfigError::ResponseTimeoutTooShort);
        }
        if self.poll_interval_ms < self.receive_timeout_ms {
            return Err(ConfigError::PollIntervalTooShort);
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Inter-byte timeout is zero
    ZeroTimeout,
    /// Response timeout does not exceed the inter-byte timeout
    ResponseTimeoutTooShort,
    /// Poll interval is shorter than the response timeout
    PollIntervalTooShort,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::ZeroTimeout => write!(f, "byte timeout must be non-zero"),
            ConfigError::ResponseTimeoutTooShort => {
                write!(f, "receive timeout must exceed the byte timeout")
            }
            ConfigError::PollIntervalTooShort => {
                write!(f, "poll interval must not be shorter than the receive timeout")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = LinkConfig::default();
        assert_eq!(cfg.byte_timeout_ms, 100);
        assert_eq!(cfg.receive_timeout_ms, 500);
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.poll_interval_ms, 15_000);
        assert_eq!(cfg.wait_sync_timeout_ms, 10_000);
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn test_validate() {
        let cfg = LinkConfig {
            receive_timeout_ms: 100,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ResponseTimeoutTooShort));

        let cfg = LinkConfig {
            byte_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroTimeout));

        let cfg = LinkConfig {
            poll_interval_ms: 200,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::PollIntervalTooShort));
    }
}
