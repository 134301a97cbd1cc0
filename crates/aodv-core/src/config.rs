//! Driver configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable overriding [`DriverConfig::queue_capacity`].
pub const QUEUE_CAPACITY_ENV: &str = "AODV_QUEUE_CAPACITY";

/// Environment variable overriding [`DriverConfig::ack_timeout`], in milliseconds.
pub const ACK_TIMEOUT_ENV: &str = "AODV_ACK_TIMEOUT_MS";

const DEFAULT_QUEUE_CAPACITY: usize = 16;
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a simulation driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Capacity of each node queue. A full queue makes the driver wait.
    pub queue_capacity: usize,

    /// How long the driver waits for every node to acknowledge an event.
    pub ack_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

impl DriverConfig {
    /// Defaults, overridden by `AODV_QUEUE_CAPACITY` and `AODV_ACK_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(QUEUE_CAPACITY_ENV) {
            config.queue_capacity = raw.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("{QUEUE_CAPACITY_ENV}={raw} is not a number"))
            })?;
        }

        if let Some(raw) = lookup(ACK_TIMEOUT_ENV) {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("{ACK_TIMEOUT_ENV}={raw} is not a number"))
            })?;
            config.ack_timeout = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the per-node queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the acknowledgment timeout.
    #[must_use]
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Reject values the driver cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig("queue capacity must be at least 1".into()));
        }
        if self.ack_timeout.is_zero() {
            return Err(Error::InvalidConfig("ack timeout must be positive".into()));
        }
        Ok(())
    }
}
