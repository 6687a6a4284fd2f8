//! Explorer configuration
//!
//! Loaded from TOML; every section is optional and falls back to defaults.
//!
//! ```toml
//! max_depth = 2
//!
//! [mode]
//! kind = "suspend"
//! input_timeout_secs = 600
//!
//! [search]
//! fetch_concurrency = 5
//!
//! [search.retry]
//! max_attempts = 3
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Generation rounds per graph
    pub max_depth: usize,
    /// Batch or suspend/resume
    pub mode: ExecutionMode,
    /// Citation search pipeline settings
    pub search: SearchConfig,
}

impl ExplorerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With max depth
    #[inline]
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// With execution mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// With search settings
    #[inline]
    #[must_use]
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(invalid("max_depth", "must be at least 1"));
        }
        self.search.validate()
    }
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            max_depth: 1,
            mode: ExecutionMode::default(),
            search: SearchConfig::default(),
        }
    }
}

/// How the scheduler treats nodes blocked on the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Stop at fixpoint; awaiting nodes are reported, never waited on
    #[default]
    Batch,
    /// Wait for `provide_input` on awaiting nodes
    Suspend {
        /// Give up waiting after this long without input
        #[serde(default)]
        input_timeout_secs: Option<u64>,
    },
}

impl ExecutionMode {
    /// Suspend mode without a timeout
    #[inline]
    #[must_use]
    pub fn suspend() -> Self {
        Self::Suspend {
            input_timeout_secs: None,
        }
    }

    /// Whether the scheduler waits on awaiting-input nodes
    #[inline]
    #[must_use]
    pub fn waits_for_input(self) -> bool {
        matches!(self, Self::Suspend { .. })
    }

    /// Input wait bound, if any
    #[inline]
    #[must_use]
    pub fn input_timeout(self) -> Option<Duration> {
        match self {
            Self::Suspend {
                input_timeout_secs: Some(secs),
            } => Some(Duration::from_secs(secs)),
            _ => None,
        }
    }
}

/// Citation search pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Concurrent page fetches per search
    pub fetch_concurrency: usize,
    /// Concurrent page analyses per search
    pub analysis_concurrency: usize,
    /// Pages kept in the fetch cache
    pub page_cache_capacity: u64,
    /// Retry policy for page analysis
    pub retry: RetryPolicy,
}

impl SearchConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_concurrency == 0 {
            return Err(invalid("search.fetch_concurrency", "must be at least 1"));
        }
        if self.analysis_concurrency == 0 {
            return Err(invalid("search.analysis_concurrency", "must be at least 1"));
        }
        self.retry.validate()
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: 5,
            analysis_concurrency: 5,
            page_cache_capacity: 1024,
            retry: RetryPolicy::default(),
        }
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff_ms: u64,
    /// Upper bound on any delay
    pub max_backoff_ms: u64,
    /// Growth factor between delays
    pub multiplier: u32,
}

impl RetryPolicy {
    /// With max attempts
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay to wait after the given failed attempt (1-based)
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(invalid("search.retry.max_attempts", "must be at least 1"));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(invalid(
                "search.retry.initial_backoff_ms",
                "must not exceed max_backoff_ms",
            ));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 4000,
            max_backoff_ms: 10_000,
            multiplier: 2,
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
