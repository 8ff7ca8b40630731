use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use voxlead_core::bookings::InvalidRange;
use voxlead_core::error::{ApiEnvelope, ErrorData, codes};

use crate::calendar::CalendarError;

/// Internal error type that converts to enveloped API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Time range with start not before end (400)
    InvalidRange { message: String },
    /// Missing or unknown tenant key (401)
    Unauthorized {
        message: String,
        docs_hint: Option<String>,
    },
    /// Referenced record absent in this tenant (404)
    NotFound { resource: String },
    /// Calendar provider rejected our credentials (401)
    ExternalAuth { message: String },
    /// Any other calendar provider failure (502)
    ExternalService {
        message: String,
        upstream_status: Option<u16>,
    },
    /// Database error (500)
    Database(sqlx::Error),
    /// Internal error (500)
    Internal(String),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
            received: None,
            docs_hint: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::InvalidRange { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized { .. } | AppError::ExternalAuth { .. } => {
                StatusCode::UNAUTHORIZED
            }
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short text recorded in the audit log for failed operations.
    pub fn audit_message(&self) -> String {
        match self {
            AppError::Validation { message, .. }
            | AppError::InvalidRange { message }
            | AppError::Unauthorized { message, .. }
            | AppError::ExternalAuth { message }
            | AppError::ExternalService { message, .. }
            | AppError::Internal(message) => message.clone(),
            AppError::NotFound { resource } => format!("{resource} not found"),
            AppError::Database(_) => "database error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();
        let status = self.status();

        let detail = |error: &str| ErrorData {
            error: error.to_string(),
            field: None,
            received: None,
            upstream_status: None,
            request_id: request_id.clone(),
            docs_hint: None,
        };

        let (message, data) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                message,
                ErrorData {
                    field,
                    received,
                    docs_hint,
                    ..detail(codes::VALIDATION_FAILED)
                },
            ),
            AppError::InvalidRange { message } => (
                message,
                ErrorData {
                    docs_hint: Some("start must be strictly before end.".to_string()),
                    ..detail(codes::INVALID_RANGE)
                },
            ),
            AppError::Unauthorized { message, docs_hint } => (
                message,
                ErrorData {
                    docs_hint,
                    ..detail(codes::UNAUTHORIZED)
                },
            ),
            AppError::NotFound { resource } => {
                (format!("{resource} not found"), detail(codes::NOT_FOUND))
            }
            AppError::ExternalAuth { message } => (
                message,
                ErrorData {
                    upstream_status: Some(401),
                    docs_hint: Some(
                        "Check the calendar API key configured for this agent.".to_string(),
                    ),
                    ..detail(codes::EXTERNAL_AUTH_FAILED)
                },
            ),
            AppError::ExternalService {
                message,
                upstream_status,
            } => (
                message,
                ErrorData {
                    upstream_status,
                    ..detail(codes::EXTERNAL_SERVICE_ERROR)
                },
            ),
            AppError::Database(err) => {
                tracing::error!(error = ?err, "database error");
                (
                    "An internal error occurred".to_string(),
                    detail(codes::INTERNAL_ERROR),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    "An internal error occurred".to_string(),
                    detail(codes::INTERNAL_ERROR),
                )
            }
        };

        (status, Json(ApiEnvelope::failure(message, data))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<InvalidRange> for AppError {
    fn from(err: InvalidRange) -> Self {
        AppError::InvalidRange {
            message: err.to_string(),
        }
    }
}

impl From<CalendarError> for AppError {
    fn from(err: CalendarError) -> Self {
        match err {
            CalendarError::NotConfigured(what) => {
                AppError::Internal(format!("calendar {what} is not configured"))
            }
            CalendarError::Auth => AppError::ExternalAuth {
                message: "Calendar API authentication failed. Please check your API key."
                    .to_string(),
            },
            CalendarError::Status { status, .. } => AppError::ExternalService {
                message: format!("Calendar API error: {status}"),
                upstream_status: Some(status),
            },
            CalendarError::Transport(err) => AppError::ExternalService {
                message: format!("Calendar API unreachable: {err}"),
                upstream_status: None,
            },
            CalendarError::Decode(reason) => AppError::ExternalService {
                message: format!("Calendar API returned an unreadable response: {reason}"),
                upstream_status: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        (
            status,
            serde_json::from_slice(&bytes).expect("body should be json"),
        )
    }

    #[tokio::test]
    async fn provider_auth_failure_is_401_with_upstream_status() {
        let (status, body) = body_json(CalendarError::Auth.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["isSuccess"], false);
        assert_eq!(body["data"]["error"], "external_auth_failed");
        assert_eq!(body["data"]["upstream_status"], 401);
    }

    #[tokio::test]
    async fn provider_status_error_is_502() {
        let err = CalendarError::Status {
            status: 503,
            body: "maintenance".to_string(),
        };
        let (status, body) = body_json(err.into()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["data"]["upstream_status"], 503);
        assert_eq!(body["message"], "Calendar API error: 503");
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_detail() {
        let (status, body) =
            body_json(AppError::Internal("secret connection string".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "An internal error occurred");
        assert!(!body.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn not_found_names_the_resource() {
        let (status, body) = body_json(AppError::NotFound {
            resource: "Lead".to_string(),
        })
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Lead not found");
    }
}
