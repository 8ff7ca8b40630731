//! Booking bridge wire types and the pure rules around them: default
//! windows, slot regrouping and provider response mapping.
//!
//! The HTTP side lives in the API crate; everything here is testable
//! without a network.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::normalize::render_utc_z;

/// Length of a booking when the caller gives no end time.
pub const DEFAULT_BOOKING_MINUTES: i64 = 15;

/// How far ahead availability looks when no end is given.
pub const AVAILABILITY_LOOKAHEAD_WEEKS: i64 = 4;

/// Primary attendee phone. The voice platform sends either a bare string or
/// an object with a `number` field.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum PhoneInput {
    Text(String),
    Object {
        #[serde(default)]
        number: Option<String>,
    },
}

impl PhoneInput {
    /// The raw number, with `unknown`/`none`/empty treated as absent.
    pub fn number(&self) -> Option<&str> {
        let raw = match self {
            Self::Text(text) => text.as_str(),
            Self::Object { number } => number.as_deref()?,
        };
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("unknown")
            || trimmed.eq_ignore_ascii_case("none")
        {
            return None;
        }
        Some(raw)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GuestAttendee {
    pub name: String,
    pub email: String,
    #[serde(default, rename = "phoneNumber")]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateBookingRequest {
    /// Primary attendee email
    pub email: String,
    /// Primary attendee name
    pub name: String,
    #[serde(default, rename = "phoneNumber")]
    pub phone_number: Option<PhoneInput>,
    /// ISO-8601 start. Defaults to now.
    #[serde(default)]
    pub start: Option<String>,
    /// ISO-8601 end. Defaults to start + 15 minutes.
    #[serde(default)]
    pub end: Option<String>,
    /// Extra attendees; their emails become provider guests
    #[serde(default)]
    pub attendees: Option<Vec<GuestAttendee>>,
    /// External call id to record the booking against
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub lead_id: Option<Uuid>,
}

impl CreateBookingRequest {
    /// Guest emails, skipping blanks.
    pub fn guest_emails(&self) -> Vec<String> {
        self.attendees
            .iter()
            .flatten()
            .map(|attendee| attendee.email.trim())
            .filter(|email| !email.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(default)]
    pub attendees: Vec<Value>,
    pub location: Option<String>,
    pub status: Option<String>,
    pub uid: Option<String>,
    pub booking_url: Option<String>,
    pub meeting_url: Option<String>,
}

impl BookingResponse {
    /// Map one provider booking object. Providers disagree on `start` vs
    /// `startTime`, so both are read.
    pub fn from_provider(item: &Value) -> Self {
        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| item.get(*key).and_then(Value::as_str))
                .map(str::to_string)
        };
        Self {
            id: item.get("id").and_then(Value::as_i64),
            title: text(&["title"]),
            description: text(&["description"]),
            start_time: text(&["start", "startTime"]),
            end_time: text(&["end", "endTime"]),
            attendees: item
                .get("attendees")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            location: text(&["location"]),
            status: text(&["status"]),
            uid: text(&["uid"]),
            booking_url: text(&["bookingUrl"]),
            meeting_url: text(&["meetingUrl"]),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BookingsListResponse {
    pub bookings: Vec<BookingResponse>,
}

impl BookingsListResponse {
    /// Accepts `data.bookings` or a bare `data` list.
    pub fn from_provider(body: &Value) -> Self {
        let data = body.get("data").unwrap_or(body);
        let items = data
            .get("bookings")
            .and_then(Value::as_array)
            .or_else(|| data.as_array());
        Self {
            bookings: items
                .into_iter()
                .flatten()
                .map(BookingResponse::from_provider)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TimeSlot {
    pub start: String,
    /// Only present when the provider returns ranges
    pub end: Option<String>,
}

impl TimeSlot {
    fn from_provider(item: &Value) -> Option<Self> {
        match item {
            Value::String(start) => Some(Self {
                start: start.clone(),
                end: None,
            }),
            Value::Object(_) => Some(Self {
                start: item.get("start").and_then(Value::as_str)?.to_string(),
                end: item.get("end").and_then(Value::as_str).map(str::to_string),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AvailabilityResponse {
    /// Slots keyed by calendar date (YYYY-MM-DD)
    pub slots: BTreeMap<String, Vec<TimeSlot>>,
}

impl AvailabilityResponse {
    /// Regroup the provider's slot payload by date.
    ///
    /// The provider normally keys slots by date already; a flat list is keyed
    /// by the date prefix of each slot's start.
    pub fn from_provider(body: &Value) -> Self {
        let data = body.get("data").unwrap_or(body);
        let data = data.get("slots").unwrap_or(data);
        let mut slots: BTreeMap<String, Vec<TimeSlot>> = BTreeMap::new();

        match data {
            Value::Object(by_date) => {
                for (date, items) in by_date {
                    let day = slots.entry(date.clone()).or_default();
                    day.extend(
                        items
                            .as_array()
                            .into_iter()
                            .flatten()
                            .filter_map(TimeSlot::from_provider),
                    );
                }
            }
            Value::Array(items) => {
                for slot in items.iter().filter_map(TimeSlot::from_provider) {
                    let date = slot.start.get(..10).unwrap_or(&slot.start).to_string();
                    slots.entry(date).or_default().push(slot);
                }
            }
            _ => {}
        }

        Self { slots }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SlotFormat {
    Time,
    Range,
}

impl SlotFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Range => "range",
        }
    }
}

/// Stored booking state. Provider vocabularies differ, so anything not
/// recognisably cancelled or rescheduled counts as booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    Booked,
    Cancelled,
    Rescheduled,
}

impl BookingStatus {
    pub fn from_provider(status: Option<&str>) -> Self {
        match status.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("cancelled" | "canceled" | "rejected") => Self::Cancelled,
            Some("rescheduled") => Self::Rescheduled,
            _ => Self::Booked,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Booked => "booked",
            Self::Cancelled => "cancelled",
            Self::Rescheduled => "rescheduled",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListBookingsQuery {
    /// Lower bound (ISO-8601)
    pub time_min: Option<String>,
    /// Upper bound (ISO-8601)
    pub time_max: Option<String>,
    pub event_type_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AvailabilityQuery {
    /// Defaults to today 00:00 UTC
    pub start: Option<String>,
    /// Defaults to four weeks from now, end of day
    pub end: Option<String>,
    pub event_type_id: Option<i64>,
    /// IANA zone the provider should render slots in
    pub timezone: Option<String>,
    /// Slot length in minutes
    pub duration: Option<u32>,
    pub format: Option<SlotFormat>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("start ({start}) must be before end ({end})")]
pub struct InvalidRange {
    pub start: String,
    pub end: String,
}

impl InvalidRange {
    fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: render_utc_z(start),
            end: render_utc_z(end),
        }
    }
}

/// Resolve a booking's start and end: start defaults to `now`, end to start
/// plus [`DEFAULT_BOOKING_MINUTES`].
pub fn resolve_booking_window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), InvalidRange> {
    let start = start.unwrap_or(now);
    let end = end.unwrap_or(start + Duration::minutes(DEFAULT_BOOKING_MINUTES));
    if start >= end {
        return Err(InvalidRange::new(start, end));
    }
    Ok((start, end))
}

/// Resolve an availability window. Start defaults to the beginning of today,
/// end to the last instant of the day [`AVAILABILITY_LOOKAHEAD_WEEKS`] out.
pub fn resolve_availability_window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), InvalidRange> {
    let start = start.unwrap_or_else(|| now.date_naive().and_time(NaiveTime::MIN).and_utc());
    let end = end.unwrap_or_else(|| {
        let last_day = (now + Duration::weeks(AVAILABILITY_LOOKAHEAD_WEEKS)).date_naive();
        last_day.and_time(end_of_day()).and_utc()
    });
    if start >= end {
        return Err(InvalidRange::new(start, end));
    }
    Ok((start, end))
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn provider_status_maps_to_stored_state() {
        assert_eq!(BookingStatus::from_provider(Some("accepted")), BookingStatus::Booked);
        assert_eq!(BookingStatus::from_provider(None), BookingStatus::Booked);
        assert_eq!(
            BookingStatus::from_provider(Some("CANCELLED")),
            BookingStatus::Cancelled
        );
        assert_eq!(BookingStatus::Rescheduled.as_str(), "rescheduled");
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 27, 10, 0, 0).unwrap()
    }

    #[test]
    fn booking_defaults_to_now_plus_fifteen_minutes() {
        let (start, end) = resolve_booking_window(None, None, now()).unwrap();
        assert_eq!(render_utc_z(start), "2026-01-27T10:00:00Z");
        assert_eq!(render_utc_z(end), "2026-01-27T10:15:00Z");
    }

    #[test]
    fn booking_end_follows_explicit_start() {
        let start = Utc.with_ymd_and_hms(2026, 2, 3, 14, 30, 0).unwrap();
        let (_, end) = resolve_booking_window(Some(start), None, now()).unwrap();
        assert_eq!(render_utc_z(end), "2026-02-03T14:45:00Z");
    }

    #[test]
    fn booking_rejects_end_before_start() {
        let start = Utc.with_ymd_and_hms(2026, 2, 3, 14, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 2, 3, 14, 0, 0).unwrap();
        assert!(resolve_booking_window(Some(start), Some(end), now()).is_err());
    }

    #[test]
    fn availability_rejects_empty_and_inverted_ranges() {
        let at = now();
        assert!(resolve_availability_window(Some(at), Some(at), at).is_err());
        let later = at + Duration::hours(1);
        let err = resolve_availability_window(Some(later), Some(at), at).unwrap_err();
        assert_eq!(err.start, "2026-01-27T11:00:00Z");
    }

    #[test]
    fn availability_defaults_span_today_to_four_weeks_out() {
        let (start, end) = resolve_availability_window(None, None, now()).unwrap();
        assert_eq!(render_utc_z(start), "2026-01-27T00:00:00Z");
        assert_eq!(render_utc_z(end), "2026-02-24T23:59:59.999999Z");
    }

    #[test]
    fn phone_input_accepts_string_or_object() {
        let text: PhoneInput = serde_json::from_value(json!("07123 456789")).unwrap();
        assert_eq!(text.number(), Some("07123 456789"));

        let object: PhoneInput = serde_json::from_value(json!({"number": "+447123456789"})).unwrap();
        assert_eq!(object.number(), Some("+447123456789"));

        let placeholder: PhoneInput = serde_json::from_value(json!("Unknown")).unwrap();
        assert_eq!(placeholder.number(), None);
        let empty: PhoneInput = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.number(), None);
    }

    #[test]
    fn guest_emails_skip_blanks() {
        let req: CreateBookingRequest = serde_json::from_value(json!({
            "email": "owner@example.com",
            "name": "Sam",
            "attendees": [
                {"name": "A", "email": "a@example.com"},
                {"name": "B", "email": "  "}
            ]
        }))
        .unwrap();
        assert_eq!(req.guest_emails(), vec!["a@example.com".to_string()]);
    }

    #[test]
    fn provider_booking_maps_start_and_end_aliases() {
        let booking = BookingResponse::from_provider(&json!({
            "id": 42,
            "uid": "bk_1",
            "title": "Audit call",
            "start": "2026-01-27T10:00:00Z",
            "endTime": "2026-01-27T10:15:00Z",
            "attendees": [{"name": "Sam"}],
            "status": "accepted",
            "meetingUrl": "https://meet.example/x"
        }));
        assert_eq!(booking.id, Some(42));
        assert_eq!(booking.start_time.as_deref(), Some("2026-01-27T10:00:00Z"));
        assert_eq!(booking.end_time.as_deref(), Some("2026-01-27T10:15:00Z"));
        assert_eq!(booking.attendees.len(), 1);
        assert_eq!(booking.booking_url, None);
    }

    #[test]
    fn bookings_list_reads_nested_or_flat_data() {
        let nested = BookingsListResponse::from_provider(&json!({
            "data": {"bookings": [{"id": 1}, {"id": 2}]}
        }));
        assert_eq!(nested.bookings.len(), 2);
        let flat = BookingsListResponse::from_provider(&json!({"data": [{"id": 3}]}));
        assert_eq!(flat.bookings[0].id, Some(3));
        assert!(BookingsListResponse::from_provider(&json!({})).bookings.is_empty());
    }

    #[test]
    fn slots_keyed_by_date_keep_ranges_and_instants() {
        let availability = AvailabilityResponse::from_provider(&json!({
            "status": "success",
            "data": {
                "2026-01-28": [
                    {"start": "2026-01-28T09:00:00Z", "end": "2026-01-28T09:15:00Z"},
                    "2026-01-28T09:30:00Z"
                ],
                "2026-01-29": []
            }
        }));
        let day = &availability.slots["2026-01-28"];
        assert_eq!(day.len(), 2);
        assert_eq!(day[0].end.as_deref(), Some("2026-01-28T09:15:00Z"));
        assert_eq!(day[1].end, None);
        assert!(availability.slots["2026-01-29"].is_empty());
    }

    #[test]
    fn flat_slot_list_is_grouped_by_start_date() {
        let availability = AvailabilityResponse::from_provider(&json!({
            "data": [
                {"start": "2026-01-28T09:00:00Z"},
                {"start": "2026-01-29T10:00:00Z"},
                {"start": "2026-01-28T11:00:00Z"}
            ]
        }));
        assert_eq!(availability.slots.len(), 2);
        assert_eq!(availability.slots["2026-01-28"].len(), 2);
    }
}
