//! Get-or-create for calls and leads, and the writes that attach them.
//!
//! Every function runs inside the caller's transaction. The unique keys
//! `(organization_id, external_call_id)` and `(organization_id, phone)` are
//! the only concurrency guards; a conflicting concurrent insert is resolved
//! by re-reading, never surfaced.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;
use voxlead_core::calls::{CallLifecycle, CallUpdate};
use voxlead_core::tools::{LeadSource, LeadUpsertStatus};

use crate::error::AppError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CallRecord {
    pub id: Uuid,
    pub lead_id: Option<Uuid>,
}

const CALL_COLUMNS: &str = "id, lead_id";

pub async fn get_or_create_call(
    tx: &mut Transaction<'_, Postgres>,
    organization_id: Uuid,
    external_call_id: &str,
    agent_id: Option<Uuid>,
) -> Result<CallRecord, AppError> {
    let inserted = sqlx::query_as::<_, CallRecord>(&format!(
        "INSERT INTO calls (id, organization_id, agent_id, external_call_id) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (organization_id, external_call_id) DO NOTHING \
         RETURNING {CALL_COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(organization_id)
    .bind(agent_id)
    .bind(external_call_id)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(call) = inserted {
        tracing::debug!(call_id = %call.id, external_call_id, "created call");
        return Ok(call);
    }

    let existing = sqlx::query_as::<_, CallRecord>(&format!(
        "SELECT {CALL_COLUMNS} FROM calls \
         WHERE organization_id = $1 AND external_call_id = $2"
    ))
    .bind(organization_id)
    .bind(external_call_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(existing)
}

/// Lead attributes from a tool request. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct LeadFields<'a> {
    pub name: Option<&'a str>,
    pub business_name: Option<&'a str>,
    pub role: Option<&'a str>,
    pub email: Option<&'a str>,
    pub industry: Option<&'a str>,
    pub location: Option<&'a str>,
    pub source: Option<LeadSource>,
    pub notes: Option<&'a str>,
}

#[derive(sqlx::FromRow)]
struct UpsertedLead {
    id: Uuid,
    inserted: bool,
}

/// Create the lead for `(organization_id, phone)` or overwrite the fields
/// present in `fields`. `phone` must already be normalized.
pub async fn upsert_lead(
    tx: &mut Transaction<'_, Postgres>,
    organization_id: Uuid,
    phone: &str,
    fields: &LeadFields<'_>,
) -> Result<(Uuid, LeadUpsertStatus), AppError> {
    let row = sqlx::query_as::<_, UpsertedLead>(
        "INSERT INTO leads \
             (id, organization_id, phone, name, business_name, role, email, industry, \
              location, source, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, COALESCE($10, $11), $12) \
         ON CONFLICT (organization_id, phone) DO UPDATE SET \
             name = COALESCE($4, leads.name), \
             business_name = COALESCE($5, leads.business_name), \
             role = COALESCE($6, leads.role), \
             email = COALESCE($7, leads.email), \
             industry = COALESCE($8, leads.industry), \
             location = COALESCE($9, leads.location), \
             source = COALESCE($10, leads.source), \
             notes = COALESCE($12, leads.notes), \
             updated_at = NOW() \
         RETURNING id, (xmax = 0) AS inserted",
    )
    .bind(Uuid::now_v7())
    .bind(organization_id)
    .bind(phone)
    .bind(fields.name)
    .bind(fields.business_name)
    .bind(fields.role)
    .bind(fields.email)
    .bind(fields.industry)
    .bind(fields.location)
    .bind(fields.source.map(LeadSource::as_str))
    .bind(LeadSource::default().as_str())
    .bind(fields.notes)
    .fetch_one(&mut **tx)
    .await?;

    let status = if row.inserted {
        LeadUpsertStatus::Created
    } else {
        LeadUpsertStatus::Updated
    };
    Ok((row.id, status))
}

/// Fails with `NotFound` unless the lead belongs to the organization.
pub async fn ensure_lead_in_org(
    tx: &mut Transaction<'_, Postgres>,
    organization_id: Uuid,
    lead_id: Uuid,
) -> Result<(), AppError> {
    let found = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM leads WHERE id = $1 AND organization_id = $2",
    )
    .bind(lead_id)
    .bind(organization_id)
    .fetch_optional(&mut **tx)
    .await?;

    found.map(|_| ()).ok_or_else(|| AppError::NotFound {
        resource: "Lead".to_string(),
    })
}

/// Set the call's lead only if none is set yet. Returns whether it was set.
pub async fn attach_lead_if_unset(
    tx: &mut Transaction<'_, Postgres>,
    call_id: Uuid,
    lead_id: Uuid,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE calls SET lead_id = $2, updated_at = NOW() \
         WHERE id = $1 AND lead_id IS NULL",
    )
    .bind(call_id)
    .bind(lead_id)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}

#[derive(sqlx::FromRow)]
struct LifecycleRow {
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    duration_sec: Option<i32>,
    recording_url: Option<String>,
    transcript: Option<String>,
    summary: Option<String>,
}

/// Apply a webhook update under a row lock so concurrent transcript
/// fragments append instead of overwriting each other.
pub async fn apply_call_update(
    tx: &mut Transaction<'_, Postgres>,
    call_id: Uuid,
    update: &CallUpdate,
) -> Result<bool, AppError> {
    if matches!(update, CallUpdate::Ignored) {
        return Ok(false);
    }

    let row = sqlx::query_as::<_, LifecycleRow>(
        "SELECT started_at, ended_at, duration_sec, recording_url, transcript, summary \
         FROM calls WHERE id = $1 FOR UPDATE",
    )
    .bind(call_id)
    .fetch_one(&mut **tx)
    .await?;

    let mut lifecycle = CallLifecycle {
        started_at: row.started_at,
        ended_at: row.ended_at,
        duration_sec: row.duration_sec,
        recording_url: row.recording_url,
        transcript: row.transcript,
        summary: row.summary,
    };
    if !lifecycle.apply(update) {
        return Ok(false);
    }

    sqlx::query(
        "UPDATE calls SET started_at = $2, ended_at = $3, duration_sec = $4, \
             recording_url = $5, transcript = $6, summary = $7, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(call_id)
    .bind(lifecycle.started_at)
    .bind(lifecycle.ended_at)
    .bind(lifecycle.duration_sec)
    .bind(&lifecycle.recording_url)
    .bind(&lifecycle.transcript)
    .bind(&lifecycle.summary)
    .execute(&mut **tx)
    .await?;
    Ok(true)
}
