use std::time::Duration;

use crate::{Error, Result};

/// Registry and consumer configuration.
///
/// Use the builder-style setters to customize, or [`Default`] for sensible
/// defaults.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use writer_registry::Config;
///
/// let config = Config::default()
///     .with_stale_after(Duration::from_secs(10))
///     .with_dead_after(Duration::from_secs(120));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Silence after which an entity is flagged as possibly lost.
    /// Default: 30 s
    pub stale_after: Duration,

    /// Silence after which an entity is evicted from the registry.
    /// Must be longer than `stale_after`.
    /// Default: 5 min
    pub dead_after: Duration,

    /// Upper bound of a single broker poll. Also bounds how long a stop
    /// request may wait while the consumer is reading.
    /// Default: 100 ms
    pub poll_timeout: Duration,

    /// Pause between two connection attempts while the broker is unreachable.
    /// Default: 500 ms
    pub retry_interval: Duration,

    /// Silence after which the consumer reports a worker as unavailable,
    /// before the registry's own staleness check would.
    /// Default: 10 s
    pub liveness_timeout: Duration,

    /// Maximum number of messages read in one consuming pass before the
    /// liveness sweep and the stop check run.
    /// Default: 64
    pub max_messages_per_pass: usize,

    /// Name given to the background consumer thread.
    /// Default: "status-consumer"
    pub thread_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            stale_after: Duration::from_secs(30),
            dead_after: Duration::from_secs(5 * 60),
            poll_timeout: Duration::from_millis(100),
            retry_interval: Duration::from_millis(500),
            liveness_timeout: Duration::from_secs(10),
            max_messages_per_pass: 64,
            thread_name: "status-consumer".to_string(),
        }
    }
}

impl Config {
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_dead_after(mut self, dead_after: Duration) -> Self {
        self.dead_after = dead_after;
        self
    }

    /// Set the broker poll timeout.
    ///
    /// Shorter timeouts make shutdown quicker at the cost of more wake-ups
    /// on an idle topic.
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_liveness_timeout(mut self, liveness_timeout: Duration) -> Self {
        self.liveness_timeout = liveness_timeout;
        self
    }

    pub fn with_max_messages_per_pass(mut self, limit: usize) -> Self {
        self.max_messages_per_pass = limit;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Check the settings for consistency.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("stale_after", self.stale_after),
            ("dead_after", self.dead_after),
            ("poll_timeout", self.poll_timeout),
            ("retry_interval", self.retry_interval),
            ("liveness_timeout", self.liveness_timeout),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(Error::InvalidConfig(format!("{name} must be greater than zero")));
        }
        if self.stale_after >= self.dead_after {
            return Err(Error::InvalidConfig(format!(
                "stale_after ({:?}) must be shorter than dead_after ({:?})",
                self.stale_after, self.dead_after
            )));
        }
        if self.max_messages_per_pass == 0 {
            return Err(Error::InvalidConfig(
                "max_messages_per_pass must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
