use std::time::Duration;

/// Runtime configuration for the interpreter.
///
/// Use the builder pattern to customize, or use [`Default`] for the values
/// the conformance fixtures are written against.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use watchspec::Config;
///
/// let config = Config::default()
///     .with_settle_delay(Duration::from_millis(50))  // faster in-memory runs
///     .with_log_mismatch_values(false);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Config {
    /// Pause between opening the change stream and running the first
    /// operation, so the stream is established before changes happen.
    /// Default: 200ms
    settle_delay: Duration,

    /// Whether a failed comparison logs the full actual and expected values
    /// at `debug` level.
    /// Default: true
    log_mismatch_values: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            settle_delay: Duration::from_millis(200),
            log_mismatch_values: true,
        }
    }
}

impl Config {
    /// Set the delay before the first scripted operation.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Returns the delay before the first scripted operation.
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Enable or disable logging both values on mismatch.
    pub fn with_log_mismatch_values(mut self, enabled: bool) -> Self {
        self.log_mismatch_values = enabled;
        self
    }

    pub fn log_mismatch_values(&self) -> bool {
        self.log_mismatch_values
    }
}
