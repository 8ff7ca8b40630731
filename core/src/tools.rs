//! Request/response types for the tool endpoints the voice agent calls
//! mid-conversation.
//!
//! Tag enums are closed: a value outside the taxonomy fails deserialization and
//! the request is rejected before it touches storage.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::qualification::RecommendedAction;

/// Tool names as recorded in the audit log.
pub mod names {
    pub const UPSERT_LEAD: &str = "upsertLead";
    pub const SAVE_FIT_CHECK: &str = "saveFitCheck";
    pub const QUALIFY_AND_TAG: &str = "qualifyAndTag";
    pub const LOG_OUTCOME: &str = "logOutcome";
    pub const HANDOFF_REQUEST: &str = "handoffRequest";
    pub const HANDOFF_STATUS: &str = "updateHandoffStatus";
    pub const BOOK_AUDIT: &str = "bookAudit";
    pub const GET_AVAILABILITY: &str = "getAvailability";

    /// Audit name for a webhook event, e.g. `webhook:call.ended`.
    pub fn webhook(event: &str) -> String {
        format!("webhook:{event}")
    }
}

macro_rules! tag_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $wire:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($wire => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

tag_enum!(
    /// Where a lead's business leaks enquiries.
    LeakTag {
        LeakSpeed => "#leak-speed",
        LeakFragmentation => "#leak-fragmentation",
        LeakFollowup => "#leak-followup",
        LeakBooking => "#leak-booking",
        LeakTraffic => "#leak-traffic",
    }
);

tag_enum!(
    /// Final disposition of a call.
    OutcomeTag {
        AuditBooked => "#audit-booked",
        RequestedInfo => "#requested-info",
        CallbackScheduled => "#callback-scheduled",
        Parked => "#parked",
        NotAFit => "#not-a-fit",
        NoAnswer => "#no-answer",
    }
);

tag_enum!(
    ResponseSpeed {
        Under10Min => "under_10_min",
        WithinHour => "within_hour",
        SameDay => "same_day",
        Later => "later",
        Unknown => "unknown",
    }
);

tag_enum!(
    PrimaryIntent {
        MoreEnquiries => "more_enquiries",
        EnquiriesNotConverting => "enquiries_not_converting",
        StopGoingCold => "stop_going_cold",
        Unknown => "unknown",
    }
);

tag_enum!(
    HandoffStatus {
        Queued => "queued",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

tag_enum!(
    LeadSource {
        InboundCall => "inbound_call",
    }
);

tag_enum!(
    /// What an agent is deployed to do. Stored on the agent row.
    AgentUseCase {
        LeadQualification => "lead_qualification",
        AppointmentBooking => "appointment_booking",
        Support => "support",
        Custom => "custom",
    }
);

tag_enum!(
    MemberRole {
        Owner => "owner",
        Admin => "admin",
        Member => "member",
    }
);

impl Default for LeadSource {
    fn default() -> Self {
        Self::InboundCall
    }
}

impl HandoffStatus {
    /// Handoffs only ever leave `queued`, and only once.
    pub fn can_transition_to(self, next: HandoffStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Completed) | (Self::Queued, Self::Cancelled)
        )
    }
}

// ──────────────────────────────────────────────
// Leads
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpsertLeadRequest {
    /// External call id from the voice platform
    #[serde(default)]
    pub call_id: Option<String>,
    pub phone: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub source: Option<LeadSource>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LeadUpsertStatus {
    Created,
    Updated,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpsertLeadResponse {
    pub lead_id: Uuid,
    pub status: LeadUpsertStatus,
}

// ──────────────────────────────────────────────
// Fit check
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FitCheckSaveRequest {
    pub call_id: String,
    pub lead_id: Uuid,
    #[serde(default)]
    pub business_offer: Option<String>,
    #[serde(default)]
    pub lead_sources: Option<Vec<String>>,
    #[serde(default)]
    pub weekly_enquiries: Option<String>,
    #[serde(default)]
    pub response_speed: Option<ResponseSpeed>,
    #[serde(default)]
    pub booking_method: Option<String>,
    #[serde(default)]
    pub has_followup_system: Option<bool>,
    #[serde(default)]
    pub capacity_next_weeks: Option<bool>,
    #[serde(default)]
    pub primary_intent: Option<PrimaryIntent>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FitCheckSaveResponse {
    pub fit_check_id: Uuid,
}

// ──────────────────────────────────────────────
// Qualification
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QualifyRequest {
    pub call_id: String,
    pub lead_id: Uuid,
    #[serde(default)]
    pub diagnosis_tag: Option<LeakTag>,
    #[serde(default)]
    pub one_sentence_summary: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QualifyResponse {
    pub qualification_id: Uuid,
    pub score: i32,
    pub recommended_action: RecommendedAction,
}

// ──────────────────────────────────────────────
// Outcome
// ──────────────────────────────────────────────

/// `note` is required here even though other payloads treat notes as optional:
/// the agent prompt relies on every outcome carrying a human-readable note.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OutcomeLogRequest {
    pub call_id: String,
    #[serde(default)]
    pub lead_id: Option<Uuid>,
    pub outcome_tag: OutcomeTag,
    pub note: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OutcomeLogResponse {
    pub ok: bool,
}

// ──────────────────────────────────────────────
// Handoff
// ──────────────────────────────────────────────

pub const HANDOFF_INSTRUCTION: &str = "I’m connecting you now. One moment please.";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HandoffRequest {
    pub call_id: String,
    pub lead_id: Uuid,
    pub reason: String,
    #[serde(default)]
    pub target_phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HandoffResponse {
    pub handoff_id: Uuid,
    pub status: HandoffStatus,
    pub instruction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HandoffStatusUpdateRequest {
    pub status: HandoffStatus,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HandoffStatusUpdateResponse {
    pub handoff_id: Uuid,
    pub previous_status: HandoffStatus,
    pub status: HandoffStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_wire_names() {
        assert_eq!(OutcomeTag::parse("#not-a-fit"), Some(OutcomeTag::NotAFit));
        assert_eq!(OutcomeTag::NotAFit.as_str(), "#not-a-fit");
        assert_eq!(LeakTag::parse("#leak-speed"), Some(LeakTag::LeakSpeed));
        assert_eq!(LeakTag::parse("leak-speed"), None);
    }

    #[test]
    fn agent_use_cases_match_the_stored_check() {
        let wire: Vec<_> = AgentUseCase::ALL.iter().map(|u| u.as_str()).collect();
        assert_eq!(
            wire,
            ["lead_qualification", "appointment_booking", "support", "custom"]
        );
        assert_eq!(AgentUseCase::parse("sales"), None);
        assert_eq!(MemberRole::parse("owner"), Some(MemberRole::Owner));
    }

    #[test]
    fn unknown_outcome_tag_fails_deserialization() {
        let body = serde_json::json!({
            "call_id": "call-1",
            "outcome_tag": "#maybe",
            "note": "unclear"
        });
        assert!(serde_json::from_value::<OutcomeLogRequest>(body).is_err());
    }

    #[test]
    fn outcome_note_is_required() {
        let body = serde_json::json!({
            "call_id": "call-1",
            "outcome_tag": "#parked"
        });
        let err = serde_json::from_value::<OutcomeLogRequest>(body).unwrap_err();
        assert!(err.to_string().contains("missing field `note`"));
    }

    #[test]
    fn handoff_leaves_queued_only_once() {
        assert!(HandoffStatus::Queued.can_transition_to(HandoffStatus::Completed));
        assert!(HandoffStatus::Queued.can_transition_to(HandoffStatus::Cancelled));
        assert!(!HandoffStatus::Completed.can_transition_to(HandoffStatus::Cancelled));
        assert!(!HandoffStatus::Cancelled.can_transition_to(HandoffStatus::Queued));
        assert!(!HandoffStatus::Queued.can_transition_to(HandoffStatus::Queued));
    }

    #[test]
    fn upsert_request_defaults_optional_fields() {
        let req: UpsertLeadRequest =
            serde_json::from_value(serde_json::json!({"phone": "07123456789"})).unwrap();
        assert!(req.call_id.is_none());
        assert!(req.source.is_none());
        assert_eq!(LeadSource::default().as_str(), "inbound_call");
    }

    #[test]
    fn webhook_audit_name_is_prefixed() {
        assert_eq!(names::webhook("call.ended"), "webhook:call.ended");
    }
}
