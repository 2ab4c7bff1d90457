//! Client configuration
//!
//! Connection parameters for a single panel instance. The CLI layer fills
//! this from arguments and environment variables; library users construct it
//! directly.

use std::time::Duration;

use crate::error::{PanelError, Result};

/// Default per-call request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of retries after the first attempt
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Default base delay for exponential backoff
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Configuration for a panel client instance
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Panel base URL, e.g. "http://127.0.0.1:2053"
    pub base_url: String,
    /// Panel login username
    pub username: String,
    /// Panel login password
    pub password: String,
    /// Per-call request timeout
    pub timeout: Duration,
    /// Retries after the first attempt for transient failures
    pub retry_attempts: u32,
    /// Base delay for exponential backoff between retries
    pub retry_delay: Duration,
}

impl PanelConfig {
    /// Create a config with default timeout/retry settings
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            timeout: DEFAULT_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(PanelError::Validation("panel base URL is required".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(PanelError::Validation(format!(
                "panel base URL must start with http:// or https://: {}",
                self.base_url
            )));
        }
        if self.username.is_empty() {
            return Err(PanelError::Validation("panel username is required".to_string()));
        }
        if self.password.is_empty() {
            return Err(PanelError::Validation("panel password is required".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(PanelError::Validation("request timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Base URL with any trailing slash removed
    pub fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
