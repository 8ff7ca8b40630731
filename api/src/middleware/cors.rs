use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;

/// Build a CORS layer from the configured origin list.
///
/// - Methods: GET, POST, OPTIONS
/// - Headers: Content-Type, X-API-KEY
/// - Max age: 3600s
///
/// Origins that are not valid header values are skipped.
pub fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("x-api-key"),
        ])
        .max_age(std::time::Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn ok() -> StatusCode {
        StatusCode::OK
    }

    async fn preflight(origin: &str) -> Option<HeaderValue> {
        let app = Router::new()
            .route("/api/bookings", get(ok))
            .layer(build_cors_layer(&["https://app.example.com".to_string()]));
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/bookings")
                    .header("origin", origin)
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");
        response
            .headers()
            .get("access-control-allow-origin")
            .cloned()
    }

    #[tokio::test]
    async fn configured_origin_is_allowed() {
        assert_eq!(
            preflight("https://app.example.com").await,
            Some(HeaderValue::from_static("https://app.example.com"))
        );
    }

    #[tokio::test]
    async fn other_origins_get_no_allow_header() {
        assert_eq!(preflight("https://evil.example.com").await, None);
    }
}
