//! How asynchronous voice-platform events change a call record.
//!
//! Events for one call arrive in any order and some arrive more than once.
//! Interpretation is split from persistence: [`interpret_event`] turns a raw
//! webhook into a [`CallUpdate`], and [`CallLifecycle::apply`] folds it into
//! the current state. Malformed optional fields are dropped, never errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::normalize::parse_timestamp_lenient;

/// Raw webhook body from the voice platform.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VoiceEvent {
    pub event: String,
    pub call_id: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEventKind {
    Started,
    Ended,
    Transcript,
    Unrecognized,
}

pub fn classify_event(event: &str) -> CallEventKind {
    match event {
        "call.started" | "call.start" => CallEventKind::Started,
        "call.ended" | "call.end" => CallEventKind::Ended,
        "transcript" | "call.transcript" | "call.transcript.partial" | "call.transcript.final" => {
            CallEventKind::Transcript
        }
        _ => CallEventKind::Unrecognized,
    }
}

/// The state change a single event asks for. Every field is optional on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum CallUpdate {
    Started {
        started_at: Option<DateTime<Utc>>,
    },
    Ended {
        ended_at: Option<DateTime<Utc>>,
        duration_sec: Option<i32>,
        recording_url: Option<String>,
        summary: Option<String>,
    },
    Transcript {
        text: Option<String>,
    },
    Ignored,
}

pub fn interpret_event(event: &str, payload: &Value) -> CallUpdate {
    match classify_event(event) {
        CallEventKind::Started => CallUpdate::Started {
            started_at: parse_timestamp_lenient(first_str(payload, &["startedAt", "startTime"])),
        },
        CallEventKind::Ended => CallUpdate::Ended {
            ended_at: parse_timestamp_lenient(first_str(payload, &["endedAt", "endTime"])),
            duration_sec: payload.get("durationSec").and_then(parse_duration_secs),
            recording_url: first_str(payload, &["recordingUrl", "recording_url"])
                .map(str::to_string),
            summary: first_str(payload, &["summary"])
                .or_else(|| {
                    payload
                        .get("analysis")
                        .and_then(|analysis| first_str(analysis, &["summary"]))
                })
                .map(str::to_string),
        },
        CallEventKind::Transcript => CallUpdate::Transcript {
            text: first_str(payload, &["text", "transcript"]).map(str::to_string),
        },
        CallEventKind::Unrecognized => CallUpdate::Ignored,
    }
}

/// Assistant id carried by the event, either at the top level or nested in `message`.
pub fn assistant_id(payload: &Value) -> Option<&str> {
    first_str(payload, &["assistantId"]).or_else(|| {
        payload
            .get("message")
            .and_then(|message| first_str(message, &["assistantId"]))
    })
}

/// First non-empty string among `keys`.
fn first_str<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| payload.get(*key).and_then(Value::as_str))
        .find(|value| !value.is_empty())
}

/// Whole seconds from a number or numeric string; fractions are truncated.
fn parse_duration_secs(value: &Value) -> Option<i32> {
    let seconds = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        _ => None,
    }?;
    if seconds < 0 {
        return None;
    }
    i32::try_from(seconds).ok()
}

/// Append a transcript fragment, separating from prior content with a newline.
pub fn append_transcript(existing: Option<&str>, fragment: &str) -> String {
    match existing {
        Some(prior) if !prior.is_empty() => format!("{prior}\n{fragment}"),
        _ => fragment.to_string(),
    }
}

/// Lifecycle columns of a call that webhooks are allowed to touch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallLifecycle {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_sec: Option<i32>,
    pub recording_url: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
}

impl CallLifecycle {
    /// Fold an update into the state. Returns whether anything changed.
    pub fn apply(&mut self, update: &CallUpdate) -> bool {
        let before = self.clone();
        match update {
            CallUpdate::Started { started_at } => {
                if let Some(at) = started_at {
                    self.started_at = Some(*at);
                }
            }
            CallUpdate::Ended {
                ended_at,
                duration_sec,
                recording_url,
                summary,
            } => {
                if let Some(at) = ended_at {
                    self.ended_at = Some(*at);
                }
                if let Some(secs) = duration_sec {
                    self.duration_sec = Some(*secs);
                }
                if let Some(url) = recording_url {
                    self.recording_url = Some(url.clone());
                }
                if let Some(text) = summary {
                    self.summary = Some(text.clone());
                }
            }
            CallUpdate::Transcript { text: Some(text) } => {
                self.transcript = Some(append_transcript(self.transcript.as_deref(), text));
            }
            CallUpdate::Transcript { text: None } | CallUpdate::Ignored => {}
        }
        *self != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn event_families_are_recognized() {
        assert_eq!(classify_event("call.start"), CallEventKind::Started);
        assert_eq!(classify_event("call.started"), CallEventKind::Started);
        assert_eq!(classify_event("call.end"), CallEventKind::Ended);
        assert_eq!(classify_event("call.transcript.final"), CallEventKind::Transcript);
        assert_eq!(classify_event("speech.update"), CallEventKind::Unrecognized);
    }

    #[test]
    fn transcript_fragments_append_in_arrival_order() {
        let mut call = CallLifecycle::default();
        for text in ["a", "b", "c"] {
            let update = interpret_event("transcript", &json!({ "text": text }));
            assert!(call.apply(&update));
        }
        assert_eq!(call.transcript.as_deref(), Some("a\nb\nc"));
    }

    #[test]
    fn transcript_key_is_a_fallback_for_text() {
        let update = interpret_event("call.transcript", &json!({ "transcript": "hello" }));
        assert_eq!(
            update,
            CallUpdate::Transcript {
                text: Some("hello".to_string())
            }
        );
    }

    #[test]
    fn append_starts_fresh_on_empty_transcript() {
        assert_eq!(append_transcript(None, "x"), "x");
        assert_eq!(append_transcript(Some(""), "x"), "x");
        assert_eq!(append_transcript(Some("w"), "x"), "w\nx");
    }

    #[test]
    fn ended_event_sets_each_field_independently() {
        let mut call = CallLifecycle::default();
        call.apply(&interpret_event(
            "call.ended",
            &json!({ "endedAt": "2026-01-27T10:05:00Z", "durationSec": 300.7 }),
        ));
        assert_eq!(
            call.ended_at,
            Some(Utc.with_ymd_and_hms(2026, 1, 27, 10, 5, 0).unwrap())
        );
        assert_eq!(call.duration_sec, Some(300));
        assert_eq!(call.recording_url, None);

        call.apply(&interpret_event(
            "call.end",
            &json!({ "recording_url": "https://rec.example/1.wav" }),
        ));
        assert_eq!(call.duration_sec, Some(300));
        assert_eq!(call.recording_url.as_deref(), Some("https://rec.example/1.wav"));
    }

    #[test]
    fn end_of_call_summary_is_read_from_analysis() {
        let mut call = CallLifecycle::default();
        call.apply(&interpret_event(
            "call.ended",
            &json!({ "analysis": { "summary": "Wants an audit next week." } }),
        ));
        assert_eq!(call.summary.as_deref(), Some("Wants an audit next week."));

        call.apply(&interpret_event("call.ended", &json!({ "summary": "Booked." })));
        assert_eq!(call.summary.as_deref(), Some("Booked."));
    }

    #[test]
    fn malformed_fields_are_ignored_not_errors() {
        let mut call = CallLifecycle {
            started_at: Some(Utc.with_ymd_and_hms(2026, 1, 27, 9, 0, 0).unwrap()),
            ..Default::default()
        };
        let changed = call.apply(&interpret_event(
            "call.started",
            &json!({ "startedAt": "not a time" }),
        ));
        assert!(!changed);
        assert!(call.started_at.is_some());

        let update = interpret_event("call.ended", &json!({ "durationSec": "soon" }));
        assert_eq!(
            update,
            CallUpdate::Ended {
                ended_at: None,
                duration_sec: None,
                recording_url: None,
                summary: None
            }
        );
        assert_eq!(
            interpret_event("call.ended", &json!({ "durationSec": -4 })),
            update
        );
    }

    #[test]
    fn start_time_is_a_fallback_key() {
        let update = interpret_event("call.start", &json!({ "startTime": "2026-01-27T10:00:00" }));
        assert_eq!(
            update,
            CallUpdate::Started {
                started_at: Some(Utc.with_ymd_and_hms(2026, 1, 27, 10, 0, 0).unwrap())
            }
        );
    }

    #[test]
    fn unrecognized_events_change_nothing() {
        let mut call = CallLifecycle::default();
        assert!(!call.apply(&interpret_event("status-update", &json!({ "text": "a" }))));
        assert_eq!(call, CallLifecycle::default());
    }

    #[test]
    fn assistant_id_is_found_at_top_level_or_in_message() {
        assert_eq!(assistant_id(&json!({ "assistantId": "asst_1" })), Some("asst_1"));
        assert_eq!(
            assistant_id(&json!({ "message": { "assistantId": "asst_2" } })),
            Some("asst_2")
        );
        assert_eq!(assistant_id(&json!({ "assistantId": "" })), None);
        assert_eq!(assistant_id(&Value::Null), None);
    }
}
