use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response envelope shared by every endpoint.
///
/// Success responses carry the operation result in `data`; failures carry an
/// [`ErrorData`] with enough context for a voice agent (or its operator) to
/// understand what went wrong without reading server logs.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    pub is_success: bool,
    pub message: String,
    pub data: T,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            is_success: true,
            message: message.into(),
            data,
        }
    }
}

impl ApiEnvelope<ErrorData> {
    pub fn failure(message: impl Into<String>, data: ErrorData) -> Self {
        Self {
            is_success: false,
            message: message.into(),
            data,
        }
    }
}

/// Failure details placed in the envelope's `data` slot.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorData {
    /// Machine-readable error code (see [`codes`])
    pub error: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Upstream HTTP status when the failure came from the calendar provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const INVALID_RANGE: &str = "invalid_range";
    pub const NOT_FOUND: &str = "not_found";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const EXTERNAL_AUTH_FAILED: &str = "external_auth_failed";
    pub const EXTERNAL_SERVICE_ERROR: &str = "external_service_error";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const RATE_LIMITED: &str = "rate_limited";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_uses_camel_case_flag() {
        let body = serde_json::to_value(ApiEnvelope::ok("done", serde_json::json!({"ok": true})))
            .unwrap();
        assert_eq!(body["isSuccess"], true);
        assert_eq!(body["message"], "done");
        assert_eq!(body["data"]["ok"], true);
    }

    #[test]
    fn failure_envelope_omits_empty_details() {
        let env = ApiEnvelope::failure(
            "Lead not found",
            ErrorData {
                error: codes::NOT_FOUND.to_string(),
                field: None,
                received: None,
                upstream_status: None,
                request_id: "req-1".to_string(),
                docs_hint: None,
            },
        );
        let body = serde_json::to_value(env).unwrap();
        assert_eq!(body["isSuccess"], false);
        assert_eq!(body["data"]["error"], "not_found");
        assert!(body["data"].get("field").is_none());
        assert!(body["data"].get("upstream_status").is_none());
    }
}
