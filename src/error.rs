use thiserror::Error;

/// Unified error type for panel client operations
#[derive(Error, Debug)]
pub enum PanelError {
    /// Caller-supplied input violates a precondition; raised before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Credentials rejected or session credential absent; terminal after one re-login
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Transport failure, timeout or HTTP status carried failure
    #[error("Network error{}: {message}", status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Network {
        status: Option<u16>,
        message: String,
    },

    /// Circuit breaker is open; the call was not attempted
    #[error("Service unavailable: {0}")]
    CircuitOpen(String),

    /// Remote API rejected the request (non-auth 4xx or success=false envelope)
    #[error("API error: {0}")]
    Api(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, PanelError>;

impl PanelError {
    /// Transient failures worth retrying: network-class errors whose status
    /// is not an authorization rejection (those go through the session
    /// manager's single re-login path instead).
    pub fn is_retryable(&self) -> bool {
        match self {
            PanelError::Network { status, .. } => !matches!(status, Some(401) | Some(403)),
            _ => false,
        }
    }

    /// True for a 401 rejection of a privileged call
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            PanelError::Network {
                status: Some(401),
                ..
            }
        )
    }

    /// Failures that count towards opening the circuit breaker. The breaker
    /// guards transport health, so auth rejections and remote validation
    /// responses do not trip it.
    pub fn counts_for_breaker(&self) -> bool {
        self.is_retryable()
    }

    /// Construct a network error without an HTTP status (connect failures, timeouts)
    pub fn network(message: impl Into<String>) -> Self {
        PanelError::Network {
            status: None,
            message: message.into(),
        }
    }

    /// Construct a network error carrying an HTTP status
    pub fn network_status(status: u16, message: impl Into<String>) -> Self {
        PanelError::Network {
            status: Some(status),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = PanelError::Validation("traffic size must be positive".to_string());
        let display = format!("{}", err);
        assert!(display.contains("Validation error"));
        assert!(display.contains("traffic size must be positive"));
    }

    #[test]
    fn test_authentication_error_display() {
        let err = PanelError::Authentication("invalid credentials".to_string());
        let display = format!("{}", err);
        assert!(display.contains("Authentication error"));
        assert!(display.contains("invalid credentials"));
    }

    #[test]
    fn test_network_error_display_with_status() {
        let err = PanelError::network_status(502, "bad gateway");
        let display = format!("{}", err);
        assert!(display.contains("Network error"));
        assert!(display.contains("502"));
        assert!(display.contains("bad gateway"));
    }

    #[test]
    fn test_network_error_display_without_status() {
        let err = PanelError::network("connection refused");
        let display = format!("{}", err);
        assert!(display.contains("Network error"));
        assert!(display.contains("connection refused"));
        assert!(!display.contains('('));
    }

    #[test]
    fn test_circuit_open_display() {
        let err = PanelError::CircuitOpen("retry in 60s".to_string());
        assert!(format!("{}", err).contains("Service unavailable"));
    }

    #[test]
    fn test_server_errors_are_retryable() {
        assert!(PanelError::network_status(500, "internal").is_retryable());
        assert!(PanelError::network_status(503, "unavailable").is_retryable());
        assert!(PanelError::network("timed out").is_retryable());
    }

    #[test]
    fn test_auth_statuses_are_not_retryable() {
        assert!(!PanelError::network_status(401, "unauthorized").is_retryable());
        assert!(!PanelError::network_status(403, "forbidden").is_retryable());
    }

    #[test]
    fn test_non_network_errors_are_not_retryable() {
        assert!(!PanelError::Validation("bad".to_string()).is_retryable());
        assert!(!PanelError::Authentication("bad".to_string()).is_retryable());
        assert!(!PanelError::Api("bad".to_string()).is_retryable());
        assert!(!PanelError::CircuitOpen("open".to_string()).is_retryable());
    }

    #[test]
    fn test_is_unauthorized() {
        assert!(PanelError::network_status(401, "unauthorized").is_unauthorized());
        assert!(!PanelError::network_status(403, "forbidden").is_unauthorized());
        assert!(!PanelError::Authentication("bad".to_string()).is_unauthorized());
    }

    #[test]
    fn test_breaker_accounting_matches_retryable_class() {
        assert!(PanelError::network_status(500, "internal").counts_for_breaker());
        assert!(!PanelError::network_status(401, "unauthorized").counts_for_breaker());
        assert!(!PanelError::Api("rejected".to_string()).counts_for_breaker());
    }
}
