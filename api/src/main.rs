use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use voxlead_core::bookings::{
    AvailabilityResponse, BookingResponse, BookingsListResponse, CreateBookingRequest,
    GuestAttendee, PhoneInput, SlotFormat, TimeSlot,
};
use voxlead_core::calls::VoiceEvent;
use voxlead_core::error::ErrorData;
use voxlead_core::qualification::RecommendedAction;
use voxlead_core::tools::{
    FitCheckSaveRequest, FitCheckSaveResponse, HandoffRequest, HandoffResponse, HandoffStatus,
    HandoffStatusUpdateRequest, HandoffStatusUpdateResponse, LeadSource, LeadUpsertStatus,
    LeakTag, OutcomeLogRequest, OutcomeLogResponse, OutcomeTag, PrimaryIntent, QualifyRequest,
    QualifyResponse, ResponseSpeed, UpsertLeadRequest, UpsertLeadResponse,
};

mod aggregate;
mod audit;
mod calendar;
mod config;
mod error;
mod extract;
mod middleware;
mod routes;
mod state;
mod tenant;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Voxlead API",
        version = "0.1.0",
        description = "Lead capture, qualification and booking backend for AI voice agents."
    ),
    paths(
        routes::health::health_check,
        routes::tools::upsert_lead,
        routes::tools::save_fit_check,
        routes::tools::score_lead,
        routes::tools::log_outcome,
        routes::tools::request_handoff,
        routes::tools::update_handoff_status,
        routes::webhooks::receive_event,
        routes::bookings::list_bookings,
        routes::bookings::create_booking,
        routes::bookings::get_availability,
    ),
    components(schemas(
        HealthResponse,
        ErrorData,
        UpsertLeadRequest,
        UpsertLeadResponse,
        LeadUpsertStatus,
        LeadSource,
        FitCheckSaveRequest,
        FitCheckSaveResponse,
        ResponseSpeed,
        PrimaryIntent,
        QualifyRequest,
        QualifyResponse,
        LeakTag,
        RecommendedAction,
        OutcomeLogRequest,
        OutcomeLogResponse,
        OutcomeTag,
        HandoffRequest,
        HandoffResponse,
        HandoffStatus,
        HandoffStatusUpdateRequest,
        HandoffStatusUpdateResponse,
        VoiceEvent,
        routes::webhooks::WebhookAck,
        CreateBookingRequest,
        PhoneInput,
        GuestAttendee,
        BookingResponse,
        BookingsListResponse,
        TimeSlot,
        SlotFormat,
        AvailabilityResponse,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_key",
            utoipa::openapi::security::SecurityScheme::ApiKey(
                utoipa::openapi::security::ApiKey::Header(
                    utoipa::openapi::security::ApiKeyValue::new("X-API-KEY"),
                ),
            ),
        );
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub calendar_configured: bool,
    pub version: String,
}

fn app(state: state::AppState) -> Router {
    let cors_layer = middleware::cors::build_cors_layer(&state.config.cors_origins);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::tools::router().layer(middleware::rate_limit::tools_layer()))
        .merge(routes::webhooks::router().layer(middleware::rate_limit::webhooks_layer()))
        .merge(routes::bookings::router().layer(middleware::rate_limit::bookings_layer()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(middleware::security_headers::apply))
                .layer(cors_layer),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    let config = match config::AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("voxlead-api: {err}");
            std::process::exit(1);
        }
    };

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "voxlead_api={level},voxlead_core={level},tower_http=info",
                    level = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let calendar = calendar::CalComClient::new(&config.calendar)
        .expect("Failed to build calendar HTTP client");

    if config.platform_tool_key.is_some() {
        tracing::warn!("VAPI_TOOL_API_KEY is set; platform-wide key accepted on webhooks and bookings (deprecated)");
    }
    if config.webhook_allow_unauthenticated {
        tracing::warn!("WEBHOOK_ALLOW_UNAUTHENTICATED is on; keyless webhooks are resolved by assistant id");
    }

    let port = config.port;
    let app_state = state::AppState {
        db: pool,
        config: Arc::new(config),
        calendar,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Voxlead API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address");
    axum::serve(
        listener,
        app(app_state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn openapi_document_is_served() {
        let response = app(tenant::tests::lazy_state(None, false))
            .oneshot(
                Request::builder()
                    .uri("/api-doc/openapi.json")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/tools/leads/upsert",
            "/api/tools/handoff/{handoff_id}/status",
            "/api/webhooks/vapi/events",
            "/api/bookings",
            "/api/bookings/availability",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
