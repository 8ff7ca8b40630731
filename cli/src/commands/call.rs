use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::util::{connect_db, exit_error, print_serialized};

#[derive(Subcommand)]
pub enum CallCommands {
    /// List an organization's calls, newest first (requires DATABASE_URL)
    List {
        #[arg(long)]
        org_id: Uuid,
        /// Maximum rows to return
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Show one call with its transcript and every tool write recorded against it
    Show {
        #[arg(long)]
        org_id: Uuid,
        /// Internal call UUID
        #[arg(long)]
        call_id: Uuid,
    },
}

pub async fn run(command: CallCommands) -> i32 {
    let pool = connect_db().await;
    match command {
        CallCommands::List { org_id, limit } => {
            if !(1..=500).contains(&limit) {
                exit_error("--limit must be between 1 and 500", None);
            }
            match list_calls(&pool, org_id, limit).await {
                Ok(calls) => print_serialized(&calls),
                Err(e) => exit_error(&format!("Failed to list calls: {e}"), None),
            }
        }
        CallCommands::Show { org_id, call_id } => match show_call(&pool, org_id, call_id).await {
            Ok(Some(detail)) => print_serialized(&detail),
            Ok(None) => exit_error(
                &format!("Call {call_id} not found in organization {org_id}"),
                Some("List calls with: voxlead call list --org-id <org>"),
            ),
            Err(e) => exit_error(&format!("Failed to load call: {e}"), None),
        },
    }
    0
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CallRow {
    pub id: Uuid,
    pub external_call_id: String,
    pub agent_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,
    pub lead_phone: Option<String>,
    pub lead_name: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_sec: Option<i32>,
    pub outcome_tag: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CallRecordRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub call: CallRow,
    pub recording_url: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub outcome_note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallDetail {
    #[serde(flatten)]
    pub call: CallRecordRow,
    pub fit_checks: Value,
    pub qualifications: Value,
    pub handoffs: Value,
    pub bookings: Value,
}

const CALL_SELECT: &str = "SELECT c.id, c.external_call_id, c.agent_id, c.lead_id, \
         l.phone AS lead_phone, l.name AS lead_name, c.started_at, c.ended_at, \
         c.duration_sec, c.outcome_tag, c.created_at";

pub async fn list_calls(
    pool: &PgPool,
    org_id: Uuid,
    limit: i64,
) -> Result<Vec<CallRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        "{CALL_SELECT} FROM calls c LEFT JOIN leads l ON l.id = c.lead_id \
         WHERE c.organization_id = $1 \
         ORDER BY c.created_at DESC, c.id DESC LIMIT $2"
    ))
    .bind(org_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Child rows of a call as a JSON array, oldest first.
async fn children(pool: &PgPool, table: &str, call_id: Uuid) -> Result<Value, sqlx::Error> {
    sqlx::query_scalar(&format!(
        "SELECT COALESCE(jsonb_agg(to_jsonb(t) - 'call_id' ORDER BY t.created_at), '[]'::jsonb) \
         FROM {table} t WHERE t.call_id = $1"
    ))
    .bind(call_id)
    .fetch_one(pool)
    .await
}

pub async fn show_call(
    pool: &PgPool,
    org_id: Uuid,
    call_id: Uuid,
) -> Result<Option<CallDetail>, sqlx::Error> {
    let call: Option<CallRecordRow> = sqlx::query_as(&format!(
        "{CALL_SELECT}, c.recording_url, c.transcript, c.summary, c.outcome_note \
         FROM calls c LEFT JOIN leads l ON l.id = c.lead_id \
         WHERE c.organization_id = $1 AND c.id = $2"
    ))
    .bind(org_id)
    .bind(call_id)
    .fetch_optional(pool)
    .await?;
    let Some(call) = call else {
        return Ok(None);
    };

    Ok(Some(CallDetail {
        call,
        fit_checks: children(pool, "fit_checks", call_id).await?,
        qualifications: children(pool, "qualifications", call_id).await?,
        handoffs: children(pool, "handoffs", call_id).await?,
        bookings: children(pool, "bookings", call_id).await?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::tests::{db_pool_if_available, insert_org};

    async fn insert_call(pool: &PgPool, org: Uuid, external_call_id: &str) -> Uuid {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO calls (id, organization_id, external_call_id, transcript, summary) \
             VALUES ($1, $2, $3, 'hello', 'booked a review')",
        )
        .bind(id)
        .bind(org)
        .bind(external_call_id)
        .execute(pool)
        .await
        .expect("call insert should succeed");
        id
    }

    #[tokio::test]
    async fn list_is_scoped_to_the_organization_and_newest_first() {
        let Some(pool) = db_pool_if_available().await else {
            return;
        };
        let org = insert_org(&pool).await;
        let other = insert_org(&pool).await;
        let first = insert_call(&pool, org, "c-1").await;
        let second = insert_call(&pool, org, "c-2").await;
        insert_call(&pool, other, "c-1").await;

        let calls = list_calls(&pool, org, 10).await.expect("list should load");
        let ids: Vec<Uuid> = calls.iter().map(|c| c.id).collect();
        assert_eq!(ids, [second, first]);

        let limited = list_calls(&pool, org, 1).await.expect("list should load");
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn show_includes_children_and_hides_other_tenants() {
        let Some(pool) = db_pool_if_available().await else {
            return;
        };
        let org = insert_org(&pool).await;
        let call_id = insert_call(&pool, org, "c-show").await;
        sqlx::query(
            "INSERT INTO handoffs (id, call_id, reason, target_phone) \
             VALUES ($1, $2, 'wants a human', '+447700900123')",
        )
        .bind(Uuid::now_v7())
        .bind(call_id)
        .execute(&pool)
        .await
        .expect("handoff insert should succeed");

        let detail = show_call(&pool, org, call_id)
            .await
            .expect("show should load")
            .expect("call should exist");
        assert_eq!(detail.call.transcript.as_deref(), Some("hello"));
        assert_eq!(detail.call.summary.as_deref(), Some("booked a review"));
        assert_eq!(detail.handoffs[0]["status"], "queued");
        assert_eq!(detail.fit_checks, serde_json::json!([]));

        let rendered = serde_json::to_value(&detail).expect("detail should serialize");
        assert_eq!(rendered["external_call_id"], "c-show");

        let other = insert_org(&pool).await;
        let hidden = show_call(&pool, other, call_id)
            .await
            .expect("show should load");
        assert!(hidden.is_none());
    }
}
