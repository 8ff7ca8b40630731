//! HTTP bridge to the Cal.com v2 API.
//!
//! Calls are synchronous from the caller's point of view, bounded by the
//! configured timeout and never retried here.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::{Value, json};
use url::Url;
use voxlead_core::bookings::{
    AvailabilityResponse, BookingResponse, BookingsListResponse, CreateBookingRequest, SlotFormat,
};
use voxlead_core::normalize::{normalize_phone, render_utc_z};

use crate::config::CalendarConfig;

const BOOKINGS_API_VERSION: &str = "2024-08-13";
const SLOTS_API_VERSION: &str = "2024-09-04";

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("calendar {0} is not configured")]
    NotConfigured(&'static str),
    #[error("calendar provider rejected the credentials")]
    Auth,
    #[error("calendar provider returned {status}")]
    Status { status: u16, body: String },
    #[error("calendar provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("calendar provider response could not be decoded: {0}")]
    Decode(String),
}

/// Calendar settings an agent may carry to override the platform default.
#[derive(Debug, Clone, Default)]
pub struct AgentCalendar {
    pub api_key: Option<String>,
    pub event_type_id: Option<i64>,
}

/// Credentials after applying precedence, plus the event types to fall back on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCalendar {
    pub api_key: String,
    pub agent_event_type_id: Option<i64>,
    pub platform_event_type_id: Option<i64>,
}

impl ResolvedCalendar {
    /// Event type for a request: explicit value, agent override, then the
    /// platform default (deprecated, logged).
    pub fn event_type(&self, requested: Option<i64>) -> Result<i64, CalendarError> {
        if let Some(id) = requested.or(self.agent_event_type_id) {
            return Ok(id);
        }
        let id = self
            .platform_event_type_id
            .ok_or(CalendarError::NotConfigured("event type"))?;
        tracing::warn!(
            event_type_id = id,
            "using platform calendar event type (deprecated fallback)"
        );
        Ok(id)
    }
}

/// Resolve which credentials a request uses: the agent's own key, else the
/// platform key. Falling back to the platform key is deprecated and logged.
pub fn resolve_calendar(
    agent: Option<&AgentCalendar>,
    platform: &CalendarConfig,
) -> Result<ResolvedCalendar, CalendarError> {
    let agent_key = agent
        .and_then(|a| a.api_key.clone())
        .filter(|key| !key.is_empty());
    let api_key = match agent_key {
        Some(key) => key,
        None => {
            let key = platform
                .api_key
                .clone()
                .ok_or(CalendarError::NotConfigured("API key"))?;
            tracing::warn!(
                agent_scoped = agent.is_some(),
                "using platform calendar API key (deprecated fallback)"
            );
            key
        }
    };

    Ok(ResolvedCalendar {
        api_key,
        agent_event_type_id: agent.and_then(|a| a.event_type_id),
        platform_event_type_id: platform.event_type_id,
    })
}

/// Filters passed through to the provider's booking list.
#[derive(Debug, Clone, Default)]
pub struct BookingFilters {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub event_type_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct SlotQuery {
    pub event_type_id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub timezone: Option<String>,
    pub duration: Option<u32>,
    pub format: Option<SlotFormat>,
}

#[derive(Clone)]
pub struct CalComClient {
    http: reqwest::Client,
    base_url: Url,
    attendee_timezone: String,
    attendee_language: String,
}

impl CalComClient {
    pub fn new(config: &CalendarConfig) -> Result<Self, CalendarError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            attendee_timezone: config.attendee_timezone.clone(),
            attendee_language: config.attendee_language.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    /// Provider payload for a new booking starting at `start`.
    pub fn booking_payload(
        &self,
        event_type_id: i64,
        request: &CreateBookingRequest,
        start: DateTime<Utc>,
    ) -> Value {
        let mut attendee = json!({
            "name": request.name,
            "email": request.email,
            "timeZone": self.attendee_timezone,
            "language": self.attendee_language,
        });
        if let Some(phone) = request
            .phone_number
            .as_ref()
            .and_then(|phone| phone.number())
            .and_then(normalize_phone)
        {
            attendee["phoneNumber"] = Value::String(phone);
        }

        let mut payload = json!({
            "eventTypeId": event_type_id,
            "start": render_utc_z(start),
            "attendee": attendee,
            "metadata": {},
        });
        let guests = request.guest_emails();
        if !guests.is_empty() {
            payload["guests"] = json!(guests);
        }
        payload
    }

    pub async fn create_booking(
        &self,
        calendar: &ResolvedCalendar,
        event_type_id: i64,
        request: &CreateBookingRequest,
        start: DateTime<Utc>,
    ) -> Result<BookingResponse, CalendarError> {
        let payload = self.booking_payload(event_type_id, request, start);

        let body = self
            .send(
                self.http
                    .post(self.endpoint("bookings"))
                    .bearer_auth(&calendar.api_key)
                    .header("cal-api-version", BOOKINGS_API_VERSION)
                    .json(&payload),
            )
            .await?;

        let item = body.get("data").unwrap_or(&body);
        let booking = BookingResponse::from_provider(item);
        tracing::info!(
            booking_id = ?booking.id,
            uid = ?booking.uid,
            event_type_id,
            "created calendar booking"
        );
        Ok(booking)
    }

    pub async fn list_bookings(
        &self,
        calendar: &ResolvedCalendar,
        filters: &BookingFilters,
    ) -> Result<BookingsListResponse, CalendarError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(start) = filters.start_time {
            params.push(("afterStart", render_utc_z(start)));
        }
        if let Some(end) = filters.end_time {
            params.push(("beforeEnd", render_utc_z(end)));
        }
        if let Some(event_type_id) = filters.event_type_id {
            params.push(("eventTypeId", event_type_id.to_string()));
        }

        let body = self
            .send(
                self.http
                    .get(self.endpoint("bookings"))
                    .bearer_auth(&calendar.api_key)
                    .header("cal-api-version", BOOKINGS_API_VERSION)
                    .query(&params),
            )
            .await?;

        let list = BookingsListResponse::from_provider(&body);
        tracing::info!(count = list.bookings.len(), "retrieved calendar bookings");
        Ok(list)
    }

    pub async fn get_availability(
        &self,
        calendar: &ResolvedCalendar,
        query: &SlotQuery,
    ) -> Result<AvailabilityResponse, CalendarError> {
        let mut params: Vec<(&str, String)> = vec![
            ("eventTypeId", query.event_type_id.to_string()),
            ("start", render_utc_z(query.start)),
            ("end", render_utc_z(query.end)),
        ];
        if let Some(timezone) = &query.timezone {
            params.push(("timeZone", timezone.clone()));
        }
        if let Some(duration) = query.duration {
            params.push(("duration", duration.to_string()));
        }
        if let Some(format) = query.format {
            params.push(("format", format.as_str().to_string()));
        }

        let body = self
            .send(
                self.http
                    .get(self.endpoint("slots"))
                    .bearer_auth(&calendar.api_key)
                    .header("cal-api-version", SLOTS_API_VERSION)
                    .query(&params),
            )
            .await?;

        let availability = AvailabilityResponse::from_provider(&body);
        tracing::info!(
            days = availability.slots.len(),
            event_type_id = query.event_type_id,
            "retrieved calendar availability"
        );
        Ok(availability)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, CalendarError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "calendar provider error");
            if status == StatusCode::UNAUTHORIZED {
                return Err(CalendarError::Auth);
            }
            return Err(CalendarError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|err| CalendarError::Decode(err.to_string()))
    }
}
