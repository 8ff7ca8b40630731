//! Append-only audit trail of tool and webhook invocations.

use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug)]
pub struct ToolCallEntry<'a> {
    pub organization_id: Option<Uuid>,
    pub call_id: Option<Uuid>,
    pub tool_name: &'a str,
    pub request: &'a Value,
    pub response: Option<Value>,
    pub success: bool,
    pub error: Option<String>,
}

impl<'a> ToolCallEntry<'a> {
    pub fn success(
        organization_id: Option<Uuid>,
        call_id: Option<Uuid>,
        tool_name: &'a str,
        request: &'a Value,
        response: Value,
    ) -> Self {
        Self {
            organization_id,
            call_id,
            tool_name,
            request,
            response: Some(response),
            success: true,
            error: None,
        }
    }
}

/// Insert an entry inside the operation's own transaction.
pub async fn record(
    tx: &mut Transaction<'_, Postgres>,
    entry: ToolCallEntry<'_>,
) -> Result<Uuid, AppError> {
    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO tool_calls \
             (id, organization_id, call_id, tool_name, request, response, success, error) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(id)
    .bind(entry.organization_id)
    .bind(entry.call_id)
    .bind(entry.tool_name)
    .bind(entry.request)
    .bind(entry.response)
    .bind(entry.success)
    .bind(entry.error)
    .execute(&mut **tx)
    .await?;
    Ok(id)
}

/// Record a failed invocation in a fresh transaction, after the operation's
/// own transaction has rolled back. An audit write failure is logged and
/// does not replace the original error.
pub async fn record_failure(
    db: &PgPool,
    organization_id: Option<Uuid>,
    tool_name: &str,
    request: &Value,
    err: &AppError,
) {
    let entry = ToolCallEntry {
        organization_id,
        call_id: None,
        tool_name,
        request,
        response: None,
        success: false,
        error: Some(err.audit_message()),
    };
    let result = async {
        let mut tx = db.begin().await?;
        record(&mut tx, entry).await?;
        tx.commit().await?;
        Ok::<_, AppError>(())
    }
    .await;

    if let Err(audit_err) = result {
        tracing::error!(
            tool = tool_name,
            error = ?audit_err,
            "failed to record audit entry for failed invocation"
        );
    }
}

/// Pass `result` through, auditing it first if it is an error.
pub async fn on_failure<T>(
    db: &PgPool,
    organization_id: Option<Uuid>,
    tool_name: &str,
    request: &Value,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    if let Err(err) = &result {
        tracing::warn!(tool = tool_name, status = %err.status(), "tool invocation failed");
        record_failure(db, organization_id, tool_name, request, err).await;
    }
    result
}

pub fn to_audit_value<T: serde::Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|err| AppError::Internal(format!("audit encode: {err}")))
}
