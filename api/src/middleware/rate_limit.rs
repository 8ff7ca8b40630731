use axum::http::{HeaderValue, Response, StatusCode};
use tower_governor::{
    GovernorError, GovernorLayer, governor::GovernorConfigBuilder,
    key_extractor::SmartIpKeyExtractor,
};
use voxlead_core::error::{ApiEnvelope, ErrorData, codes};

type RateLimitLayer =
    GovernorLayer<SmartIpKeyExtractor, governor::middleware::NoOpMiddleware, axum::body::Body>;

/// Build a per-IP limiter replenishing one request every `replenish_ms`.
fn layer(replenish_ms: u64, burst: u32) -> RateLimitLayer {
    let config = GovernorConfigBuilder::default()
        .per_millisecond(replenish_ms)
        .burst_size(burst)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("rate limit config must have non-zero period and burst");
    GovernorLayer::new(config).error_handler(json_error_handler)
}

/// Tool endpoints: 300 requests/minute per IP. One agent may run many
/// concurrent calls from the platform's egress addresses.
pub fn tools_layer() -> RateLimitLayer {
    layer(200, 60)
}

/// Webhook endpoint: 600 requests/minute per IP; transcript events are bursty.
pub fn webhooks_layer() -> RateLimitLayer {
    layer(100, 120)
}

/// Booking endpoints: 60 requests/minute per IP. Each one calls the provider.
pub fn bookings_layer() -> RateLimitLayer {
    layer(1000, 20)
}

/// Enveloped JSON error with a Retry-After header.
fn json_error_handler(err: GovernorError) -> Response<axum::body::Body> {
    let (status, retry_after, message) = match err {
        GovernorError::TooManyRequests { wait_time, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            Some(wait_time),
            format!("Too many requests. Retry after {wait_time} seconds."),
        ),
        GovernorError::UnableToExtractKey => (
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            "Unable to determine client identity for rate limiting".to_string(),
        ),
        GovernorError::Other { code, msg, .. } => (code, None, msg.unwrap_or_default()),
    };

    let envelope = ApiEnvelope::failure(
        message,
        ErrorData {
            error: codes::RATE_LIMITED.to_string(),
            field: None,
            received: None,
            upstream_status: None,
            request_id: uuid::Uuid::now_v7().to_string(),
            docs_hint: None,
        },
    );
    let body = serde_json::to_string(&envelope).unwrap_or_default();

    let mut response = Response::new(axum::body::Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        "content-type",
        HeaderValue::from_static("application/json"),
    );
    if let Some(wait) = retry_after {
        response
            .headers_mut()
            .insert("retry-after", HeaderValue::from(wait));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn too_many_requests_is_enveloped_with_retry_after() {
        let response = json_error_handler(GovernorError::TooManyRequests {
            wait_time: 7,
            headers: None,
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "7");

        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body["isSuccess"], false);
        assert_eq!(body["data"]["error"], "rate_limited");
    }

    #[test]
    fn layers_build() {
        let _ = tools_layer();
        let _ = webhooks_layer();
        let _ = bookings_layer();
    }
}
