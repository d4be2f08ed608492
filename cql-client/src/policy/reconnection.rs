//! Reconnection delay policies.

use std::fmt;
use std::time::Duration;

use crate::config::{ConfigError, ReconnectionConfig};

/// Hands out delay schedules for reconnection sessions.
///
/// Each session gets its own schedule so that backoff state never leaks
/// from one session into the next.
pub trait ReconnectionPolicy: Send + Sync + fmt::Debug {
    /// Creates a fresh schedule for a new reconnection session.
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule>;
}

/// A stateful sequence of delays between reconnection attempts.
pub trait ReconnectionSchedule: Send {
    /// Returns the delay before the next attempt.
    fn next_delay(&mut self) -> Duration;
}

/// Doubles the delay after every attempt, up to a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialReconnectionPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl ExponentialReconnectionPolicy {
    /// Creates a policy starting at `base_delay` and capped at `max_delay`.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Result<Self, ConfigError> {
        if base_delay.is_zero() {
            return Err(ConfigError::new("base_delay must be positive"));
        }
        if base_delay > max_delay {
            return Err(ConfigError::new("base_delay must not exceed max_delay"));
        }
        Ok(Self {
            base_delay,
            max_delay,
        })
    }

    /// Returns the first delay of each schedule.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Returns the delay ceiling.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for ExponentialReconnectionPolicy {
    fn default() -> Self {
        Self::from(&ReconnectionConfig::default())
    }
}

impl From<&ReconnectionConfig> for ExponentialReconnectionPolicy {
    fn from(config: &ReconnectionConfig) -> Self {
        // ReconnectionConfig is validated on build.
        Self {
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
        }
    }
}

impl ReconnectionPolicy for ExponentialReconnectionPolicy {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule> {
        Box::new(ExponentialSchedule {
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            attempts: 0,
        })
    }
}

#[derive(Debug)]
struct ExponentialSchedule {
    base_delay: Duration,
    max_delay: Duration,
    attempts: u32,
}

impl ReconnectionSchedule for ExponentialSchedule {
    fn next_delay(&mut self) -> Duration {
        let delay = 1u32
            .checked_shl(self.attempts)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |d| d.min(self.max_delay));
        if delay < self.max_delay {
            self.attempts += 1;
        }
        delay
    }
}

/// Waits the same delay between every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantReconnectionPolicy {
    delay: Duration,
}

impl ConstantReconnectionPolicy {
    /// Creates a policy with a fixed delay.
    pub fn new(delay: Duration) -> Result<Self, ConfigError> {
        if delay.is_zero() {
            return Err(ConfigError::new("delay must be positive"));
        }
        Ok(Self { delay })
    }

    /// Returns the fixed delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl ReconnectionPolicy for ConstantReconnectionPolicy {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule> {
        Box::new(ConstantSchedule(self.delay))
    }
}

#[derive(Debug)]
struct ConstantSchedule(Duration);

impl ReconnectionSchedule for ConstantSchedule {
    fn next_delay(&mut self) -> Duration {
        self.0
    }
}
