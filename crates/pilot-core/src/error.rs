//! Unified error types for Pilot

use thiserror::Error;

/// Unified error type for all Pilot operations
#[derive(Error, Debug)]
pub enum PilotError {
    // Guard errors
    #[error("Repeated call blocked: {name} called again with identical arguments {args}")]
    RepeatedCall { name: String, args: String },

    // Environment errors
    #[error("Environment unavailable: {0}")]
    EnvironmentUnavailable(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Tab not found: {0}")]
    TabNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Browser error: {0}")]
    Browser(String),

    // Oracle errors
    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Oracle rate limit: {0}")]
    OracleLimit(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Plan could not be parsed: {0}")]
    PlanParse(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl PilotError {
    /// Stable class name reported in structured operation failures.
    ///
    /// The planner keys its remediation hints off these names, so they must not change.
    pub fn error_type(&self) -> &'static str {
        match self {
            PilotError::RepeatedCall { .. } => "RepeatedCallError",
            PilotError::EnvironmentUnavailable(_) => "EnvironmentUnavailable",
            PilotError::Connection(_) => "ConnectionError",
            PilotError::Timeout(_) => "TimeoutError",
            PilotError::Network(_) => "NetworkError",
            PilotError::ElementNotFound(_) => "ElementNotFoundError",
            PilotError::TabNotFound(_) => "TabNotFoundError",
            PilotError::InvalidArgument(_) => "InvalidArgumentError",
            PilotError::Browser(_) => "BrowserError",
            PilotError::Oracle(_) => "OracleError",
            PilotError::OracleLimit(_) => "OracleLimitError",
            PilotError::Auth(_) => "AuthError",
            PilotError::PlanParse(_) => "PlanParseError",
            PilotError::Config(_) => "ConfigError",
            PilotError::Io(_) => "IoError",
            PilotError::Serialization(_) => "SerializationError",
            PilotError::Yaml(_) => "YamlError",
            PilotError::Other(_) => "Error",
        }
    }

    /// Whether this failure belongs to the connection/timeout/network class
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PilotError::Connection(_) | PilotError::Timeout(_) | PilotError::Network(_)
        )
    }
}

/// Error type names treated as transient by the recovery policy
pub const TRANSIENT_ERROR_TYPES: [&str; 3] = ["ConnectionError", "TimeoutError", "NetworkError"];

/// Whether a structured failure's `error_type` names a transient failure
pub fn is_transient_error_type(error_type: &str) -> bool {
    TRANSIENT_ERROR_TYPES.contains(&error_type)
}

/// Result type alias using PilotError
pub type Result<T> = std::result::Result<T, PilotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification_matches_type_names() {
        let errors = [
            PilotError::Connection("refused".into()),
            PilotError::Timeout("30s".into()),
            PilotError::Network("reset".into()),
        ];
        for err in &errors {
            assert!(err.is_transient());
            assert!(is_transient_error_type(err.error_type()));
        }

        let other = PilotError::ElementNotFound("//button".into());
        assert!(!other.is_transient());
        assert!(!is_transient_error_type(other.error_type()));
        assert!(other.error_type().contains("NotFound"));
    }

    #[test]
    fn test_repeated_call_message() {
        let err = PilotError::RepeatedCall {
            name: "click_element".into(),
            args: r#"{"xpath":"//a"}"#.into(),
        };
        assert_eq!(err.error_type(), "RepeatedCallError");
        assert!(err.to_string().contains("click_element"));
    }
}
