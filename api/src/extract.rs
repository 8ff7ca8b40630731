//! Extractors that turn axum rejections into enveloped `AppError` responses.
//!
//! Use `AppJson<T>` / `AppQuery<T>` in place of `axum::Json<T>` / `axum::extract::Query<T>`
//! so a malformed body or query string yields a 400 envelope rather than axum's
//! plain-text 422.

use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Query, Request,
        rejection::{JsonRejection, QueryRejection},
    },
    http::request::Parts,
};

use crate::error::AppError;

const SCHEMA_HINT: &str = "Check the request against the endpoint's schema (GET /api-doc/openapi.json).";

pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(map_json_rejection(rejection)),
        }
    }
}

pub struct AppQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(AppQuery(value)),
            Err(rejection) => {
                let body_text = rejection.body_text();
                Err(AppError::Validation {
                    field: Some(
                        extract_field_from_serde_message(&body_text)
                            .unwrap_or_else(|| "query".to_string()),
                    ),
                    message: format!("Invalid query string: {body_text}"),
                    received: None,
                    docs_hint: Some(SCHEMA_HINT.to_string()),
                })
            }
        }
    }
}

pub fn map_json_rejection(rejection: JsonRejection) -> AppError {
    let body_text = rejection.body_text();
    let field_hint = extract_field_from_serde_message(&body_text);

    AppError::Validation {
        message: format!("Invalid request body: {body_text}"),
        field: Some(field_hint.unwrap_or_else(|| "body".to_string())),
        received: None,
        docs_hint: Some(SCHEMA_HINT.to_string()),
    }
}

/// Field name from serde's `missing field` / `unknown field` messages.
fn extract_field_from_serde_message(msg: &str) -> Option<String> {
    ["missing field `", "unknown field `"]
        .iter()
        .find_map(|pattern| {
            let start = msg.find(pattern)? + pattern.len();
            let after = &msg[start..];
            let end = after.find('`')?;
            Some(after[..end].to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;
    use voxlead_core::tools::OutcomeLogRequest;

    #[test]
    fn extracts_missing_field_name() {
        let msg = "Failed to deserialize the JSON body: missing field `note` at line 1 column 40";
        assert_eq!(extract_field_from_serde_message(msg), Some("note".to_string()));
    }

    #[test]
    fn extracts_unknown_field_name() {
        let msg = "unknown field `foo`, expected one of `bar`, `baz`";
        assert_eq!(extract_field_from_serde_message(msg), Some("foo".to_string()));
    }

    #[test]
    fn returns_none_for_generic_error() {
        assert_eq!(
            extract_field_from_serde_message("invalid type: string, expected u64"),
            None
        );
    }

    async fn accept_outcome(AppJson(req): AppJson<OutcomeLogRequest>) -> impl IntoResponse {
        req.note
    }

    #[tokio::test]
    async fn missing_required_field_is_a_400_envelope() {
        let app = Router::new().route("/outcome", post(accept_outcome));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/outcome")
                    .header("content-type", "application/json")
                    .body(Body::from(r##"{"call_id":"c-1","outcome_tag":"#parked"}"##))
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body["isSuccess"], false);
        assert_eq!(body["data"]["error"], "validation_failed");
        assert_eq!(body["data"]["field"], "note");
    }
}
