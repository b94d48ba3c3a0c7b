use serde::{Deserialize, Serialize};

/// Uniform API error body returned by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP reason phrase, e.g. "Forbidden"
    pub error: String,

    /// Human-readable explanation
    pub message: String,

    /// HTTP status code
    pub status: u16,

    /// Error category used by clients for routing:
    /// - "authentication_error" - missing, expired or forged credential
    /// - "authorization_error" - caller may not touch this resource
    /// - "validation_error" - request failed input validation
    /// - "not_found_error" - resource does not exist
    /// - "server_error" - internal failure
    pub error_type: String,

    /// Stable machine-readable code, see [`error_codes`]
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            details: None,
            trace_id: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_trace_id(mut self, trace_id: String) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}

/// Standard error codes
pub mod error_codes {
    // Authentication
    pub const TOKEN_INVALID: &str = "TOKEN_INVALID";
    pub const TOKEN_MISSING: &str = "TOKEN_MISSING";

    // Authorization
    pub const NOT_PARTICIPANT: &str = "NOT_PARTICIPANT";
    pub const MESSAGING_NOT_ALLOWED: &str = "MESSAGING_NOT_ALLOWED";
    pub const AUTHORIZATION_ERROR: &str = "AUTHORIZATION_ERROR";

    // Resources
    pub const CONVERSATION_NOT_FOUND: &str = "CONVERSATION_NOT_FOUND";
    pub const MESSAGE_NOT_FOUND: &str = "MESSAGE_NOT_FOUND";

    // Validation
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

    // Server
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_skipped() {
        let body = ErrorResponse::new(
            "Not Found",
            "conversation not found",
            404,
            "not_found_error",
            error_codes::CONVERSATION_NOT_FOUND,
        );
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["status"], 404);
        assert_eq!(json["code"], "CONVERSATION_NOT_FOUND");
        assert!(json.get("details").is_none());
        assert!(json.get("trace_id").is_none());
    }

    #[test]
    fn test_builder_fields() {
        let body = ErrorResponse::new("Error", "boom", 500, "server_error", "X")
            .with_details("pool timed out".into())
            .with_trace_id("abc".into());

        assert_eq!(body.details.as_deref(), Some("pool timed out"));
        assert_eq!(body.trace_id.as_deref(), Some("abc"));
    }
}
