use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;
use voxlead_core::bookings::{
    AvailabilityQuery, AvailabilityResponse, BookingResponse, BookingStatus, BookingsListResponse,
    CreateBookingRequest, ListBookingsQuery, resolve_availability_window, resolve_booking_window,
};
use voxlead_core::error::{ApiEnvelope, ErrorData};
use voxlead_core::normalize::parse_timestamp;
use voxlead_core::tools::names;

use crate::aggregate::{attach_lead_if_unset, ensure_lead_in_org, get_or_create_call};
use crate::audit::{self, ToolCallEntry, to_audit_value};
use crate::calendar::{BookingFilters, ResolvedCalendar, SlotQuery, resolve_calendar};
use crate::error::AppError;
use crate::extract::{AppJson, AppQuery};
use crate::state::AppState;
use crate::tenant::{AuthenticatedAgent, TenantContext};

const PROVIDER_NAME: &str = "cal.com";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/bookings", get(list_bookings).post(create_booking))
        .route("/api/bookings/availability", get(get_availability))
}

fn parse_optional_time(field: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, AppError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => parse_timestamp(value).map(Some).map_err(|err| AppError::Validation {
            message: err.to_string(),
            field: Some(field.to_string()),
            received: Some(Value::String(value.to_string())),
            docs_hint: Some("Use ISO-8601, e.g. 2026-01-27T10:00:00Z.".to_string()),
        }),
    }
}

/// Calendar credentials for the caller. The platform context is the
/// deprecated single-tenant path.
fn calendar_for(state: &AppState, tenant: &TenantContext) -> Result<ResolvedCalendar, AppError> {
    if matches!(tenant, TenantContext::Platform) {
        tracing::warn!("booking request authenticated with the platform key (deprecated)");
    }
    let agent_calendar = tenant.agent().map(|agent| &agent.calendar);
    resolve_calendar(agent_calendar, &state.config.calendar).map_err(AppError::from)
}

fn organization_of(tenant: &TenantContext) -> Option<Uuid> {
    tenant.agent().map(|agent| agent.organization_id)
}

/// List bookings from the calendar provider
#[utoipa::path(
    get,
    path = "/api/bookings",
    params(ListBookingsQuery),
    responses(
        (status = 200, description = "Bookings", body = ApiEnvelope<BookingsListResponse>),
        (status = 400, description = "Malformed filter", body = ApiEnvelope<ErrorData>),
        (status = 401, description = "Missing or invalid key", body = ApiEnvelope<ErrorData>),
        (status = 502, description = "Calendar provider error", body = ApiEnvelope<ErrorData>)
    ),
    security(("api_key" = [])),
    tag = "bookings"
)]
pub async fn list_bookings(
    State(state): State<AppState>,
    tenant: TenantContext,
    AppQuery(query): AppQuery<ListBookingsQuery>,
) -> Result<Json<ApiEnvelope<BookingsListResponse>>, AppError> {
    let filters = BookingFilters {
        start_time: parse_optional_time("time_min", query.time_min.as_deref())?,
        end_time: parse_optional_time("time_max", query.time_max.as_deref())?,
        event_type_id: query.event_type_id,
    };
    let calendar = calendar_for(&state, &tenant)?;
    let bookings = state.calendar.list_bookings(&calendar, &filters).await?;
    Ok(Json(ApiEnvelope::ok("Bookings retrieved", bookings)))
}

/// Query open slots, grouped by date
#[utoipa::path(
    get,
    path = "/api/bookings/availability",
    params(AvailabilityQuery),
    responses(
        (status = 200, description = "Available slots", body = ApiEnvelope<AvailabilityResponse>),
        (status = 400, description = "Invalid range or parameter", body = ApiEnvelope<ErrorData>),
        (status = 401, description = "Missing or invalid key", body = ApiEnvelope<ErrorData>),
        (status = 502, description = "Calendar provider error", body = ApiEnvelope<ErrorData>)
    ),
    security(("api_key" = [])),
    tag = "bookings"
)]
pub async fn get_availability(
    State(state): State<AppState>,
    tenant: TenantContext,
    AppQuery(query): AppQuery<AvailabilityQuery>,
) -> Result<Json<ApiEnvelope<AvailabilityResponse>>, AppError> {
    let start = parse_optional_time("start", query.start.as_deref())?;
    let end = parse_optional_time("end", query.end.as_deref())?;
    let (start, end) = resolve_availability_window(start, end, Utc::now())?;

    let timezone = query
        .timezone
        .as_deref()
        .map(str::trim)
        .filter(|tz| !tz.is_empty());
    if let Some(tz) = timezone {
        if tz.parse::<chrono_tz::Tz>().is_err() {
            return Err(AppError::Validation {
                message: format!("'{tz}' is not an IANA time zone"),
                field: Some("timezone".to_string()),
                received: Some(Value::String(tz.to_string())),
                docs_hint: Some("Use a zone name such as Europe/London.".to_string()),
            });
        }
    }

    let calendar = calendar_for(&state, &tenant)?;
    let slot_query = SlotQuery {
        event_type_id: calendar.event_type(query.event_type_id)?,
        start,
        end,
        timezone: timezone.map(str::to_string),
        duration: query.duration,
        format: query.format,
    };
    let availability = state.calendar.get_availability(&calendar, &slot_query).await?;
    Ok(Json(ApiEnvelope::ok("Availability retrieved", availability)))
}

/// Book a slot with the calendar provider
#[utoipa::path(
    post,
    path = "/api/bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 200, description = "Booking created", body = ApiEnvelope<BookingResponse>),
        (status = 400, description = "Validation error", body = ApiEnvelope<ErrorData>),
        (status = 401, description = "Missing key or provider auth failure", body = ApiEnvelope<ErrorData>),
        (status = 404, description = "Lead not found", body = ApiEnvelope<ErrorData>),
        (status = 502, description = "Calendar provider error", body = ApiEnvelope<ErrorData>)
    ),
    security(("api_key" = [])),
    tag = "bookings"
)]
pub async fn create_booking(
    State(state): State<AppState>,
    tenant: TenantContext,
    AppJson(req): AppJson<CreateBookingRequest>,
) -> Result<Json<ApiEnvelope<BookingResponse>>, AppError> {
    let request = to_audit_value(&req)?;
    let result = create_booking_inner(&state, &tenant, &req, &request).await;
    let booking = audit::on_failure(
        &state.db,
        organization_of(&tenant),
        names::BOOK_AUDIT,
        &request,
        result,
    )
    .await?;
    Ok(Json(ApiEnvelope::ok("Booking created", booking)))
}

async fn create_booking_inner(
    state: &AppState,
    tenant: &TenantContext,
    req: &CreateBookingRequest,
    request: &Value,
) -> Result<BookingResponse, AppError> {
    if req.email.trim().is_empty() {
        return Err(AppError::validation("email", "email must not be empty"));
    }
    if req.name.trim().is_empty() {
        return Err(AppError::validation("name", "name must not be empty"));
    }
    let start = parse_optional_time("start", req.start.as_deref())?;
    let end = parse_optional_time("end", req.end.as_deref())?;
    let (start, end) = resolve_booking_window(start, end, Utc::now())?;

    let calendar = calendar_for(state, tenant)?;
    let event_type_id = calendar.event_type(None)?;

    let external_call_id = req
        .call_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    if let (Some(agent), Some(lead_id)) = (tenant.agent(), req.lead_id) {
        let mut tx = state.db.begin().await?;
        ensure_lead_in_org(&mut tx, agent.organization_id, lead_id).await?;
        tx.rollback().await?;
    }
    if external_call_id.is_some() && tenant.agent().is_none() {
        tracing::warn!("call_id ignored on platform-key booking; no tenant to record it against");
    }

    let booking = state
        .calendar
        .create_booking(&calendar, event_type_id, req, start)
        .await?;

    let mut tx = state.db.begin().await?;
    let call_id = match (tenant.agent(), external_call_id) {
        (Some(agent), Some(external_call_id)) => Some(
            persist_booking(
                &mut tx,
                agent,
                external_call_id,
                req.lead_id,
                &booking,
                start,
                end,
                &state.config.calendar.attendee_timezone,
            )
            .await?,
        ),
        _ => None,
    };
    audit::record(
        &mut tx,
        ToolCallEntry::success(
            organization_of(tenant),
            call_id,
            names::BOOK_AUDIT,
            request,
            to_audit_value(&booking)?,
        ),
    )
    .await?;
    tx.commit().await?;

    Ok(booking)
}

/// Record a provider booking against the call. Returns the call id.
async fn persist_booking(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    agent: &AuthenticatedAgent,
    external_call_id: &str,
    lead_id: Option<Uuid>,
    booking: &BookingResponse,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    timezone: &str,
) -> Result<Uuid, AppError> {
    let call = get_or_create_call(
        tx,
        agent.organization_id,
        external_call_id,
        Some(agent.agent_id),
    )
    .await?;
    if let (Some(lead_id), None) = (lead_id, call.lead_id) {
        attach_lead_if_unset(tx, call.id, lead_id).await?;
    }

    sqlx::query(
        "INSERT INTO bookings \
             (id, call_id, lead_id, provider, provider_booking_id, provider_uid, \
              start_at, end_at, timezone, meeting_url, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(Uuid::now_v7())
    .bind(call.id)
    .bind(lead_id)
    .bind(PROVIDER_NAME)
    .bind(booking.id)
    .bind(booking.uid.as_deref())
    .bind(start)
    .bind(end)
    .bind(timezone)
    .bind(booking.meeting_url.as_deref())
    .bind(BookingStatus::from_provider(booking.status.as_deref()).as_str())
    .execute(&mut **tx)
    .await?;

    tracing::info!(
        call_id = %call.id,
        provider_uid = ?booking.uid,
        "booking recorded against call"
    );
    Ok(call.id)
}
