//! Configuration for vtree.
//!
//! This module provides runtime configuration for the invocation engine and
//! content buffers. Use [`ConfigBuilder`] at application startup to override
//! the defaults; every [`Engine`](crate::Engine) created afterwards picks them up.

use std::sync::OnceLock;
use std::time::Duration;

/// Global configuration, initialized via [`ConfigBuilder::init`].
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Runtime configuration for vtree.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long the engine waits for a handler call before it starts
    /// reporting progress, and the interval between subsequent progress ticks.
    pub poll_interval: Duration,
    /// Number of pooled worker threads. Calls beyond that run on dedicated
    /// threads.
    pub worker_threads: usize,
    /// File name prefix of transient content buffers.
    pub buffer_prefix: String,
    /// Source tag attached to every error reported to the host.
    pub error_source: String,
    /// Activity text shown by the progress reporter.
    pub progress_activity: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            worker_threads: 4,
            buffer_prefix: "vtree-".to_string(),
            error_source: "vtree".to_string(),
            progress_activity: "Retrieving data".to_string(),
        }
    }
}

/// Configuration builder for fluent API.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    poll_interval: Option<Duration>,
    worker_threads: Option<usize>,
    buffer_prefix: Option<String>,
    error_source: Option<String>,
    progress_activity: Option<String>,
}

impl ConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bounded-wait interval of the invocation engine.
    ///
    /// Default: 1000 ms
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Set the number of handler worker threads (at least one).
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads.max(1));
        self
    }

    /// Set the file name prefix of transient content buffers.
    pub fn buffer_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.buffer_prefix = Some(prefix.into());
        self
    }

    /// Set the source tag attached to reported errors.
    ///
    /// # Example
    ///
    /// ```
    /// use vtree::config::ConfigBuilder;
    ///
    /// let config = ConfigBuilder::new().error_source("my-provider").build();
    /// assert_eq!(config.error_source, "my-provider");
    /// ```
    pub fn error_source(mut self, source: impl Into<String>) -> Self {
        self.error_source = Some(source.into());
        self
    }

    /// Set the activity text of the progress reporter.
    pub fn progress_activity(mut self, activity: impl Into<String>) -> Self {
        self.progress_activity = Some(activity.into());
        self
    }

    /// Build the configuration without installing it globally.
    pub fn build(self) -> Config {
        let defaults = Config::default();
        Config {
            poll_interval: self.poll_interval.unwrap_or(defaults.poll_interval),
            worker_threads: self.worker_threads.unwrap_or(defaults.worker_threads),
            buffer_prefix: self.buffer_prefix.unwrap_or(defaults.buffer_prefix),
            error_source: self.error_source.unwrap_or(defaults.error_source),
            progress_activity: self
                .progress_activity
                .unwrap_or(defaults.progress_activity),
        }
    }

    /// Build and initialize the global configuration.
    ///
    /// This can only be called once. Subsequent calls are ignored.
    /// Returns `true` if configuration was set, `false` if already initialized.
    pub fn init(self) -> bool {
        CONFIG.set(self.build()).is_ok()
    }
}

/// Initialize vtree with default configuration.
///
/// This is equivalent to `ConfigBuilder::new().init()`.
pub fn init_default() -> bool {
    ConfigBuilder::new().init()
}

/// Get the current configuration, or default if not initialized.
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}
