use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;
use voxlead_core::calls::{VoiceEvent, assistant_id, interpret_event};
use voxlead_core::error::{ApiEnvelope, ErrorData};
use voxlead_core::tools::names;

use crate::aggregate::{apply_call_update, get_or_create_call};
use crate::audit::{self, ToolCallEntry, to_audit_value};
use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;
use crate::tenant::{AuthenticatedAgent, TenantContext, WebhookCaller, find_agent_by_assistant_id};

pub fn router() -> Router<AppState> {
    Router::new().route("/api/webhooks/vapi/events", post(receive_event))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    /// Internal call id, absent when no tenant could be resolved
    pub call_id: Option<Uuid>,
    pub event: String,
    /// Whether the event changed the call record
    pub applied: bool,
}

/// Receive an asynchronous call lifecycle or transcript event
#[utoipa::path(
    post,
    path = "/api/webhooks/vapi/events",
    request_body = VoiceEvent,
    responses(
        (status = 200, description = "Event accepted", body = ApiEnvelope<WebhookAck>),
        (status = 400, description = "Validation error", body = ApiEnvelope<ErrorData>),
        (status = 401, description = "Missing or invalid key", body = ApiEnvelope<ErrorData>)
    ),
    security(("api_key" = [])),
    tag = "webhooks"
)]
pub async fn receive_event(
    State(state): State<AppState>,
    WebhookCaller(caller): WebhookCaller,
    AppJson(event): AppJson<VoiceEvent>,
) -> Result<Json<ApiEnvelope<WebhookAck>>, AppError> {
    let tool_name = names::webhook(&event.event);
    let request = to_audit_value(&event)?;

    let agent = match caller {
        Some(TenantContext::Agent(agent)) => Some(agent),
        Some(TenantContext::Platform) | None => match assistant_id(&event.payload) {
            Some(id) => find_agent_by_assistant_id(&state.db, id).await?,
            None => None,
        },
    };

    let result = match &agent {
        Some(agent) => apply_event(&state, agent, &event, &tool_name, &request).await,
        None => record_unresolved(&state, &event, &tool_name, &request).await,
    };
    let ack = audit::on_failure(
        &state.db,
        agent.as_ref().map(|a| a.organization_id),
        &tool_name,
        &request,
        result,
    )
    .await?;
    Ok(Json(ApiEnvelope::ok("Event received", ack)))
}

async fn apply_event(
    state: &AppState,
    agent: &AuthenticatedAgent,
    event: &VoiceEvent,
    tool_name: &str,
    request: &Value,
) -> Result<WebhookAck, AppError> {
    let external_call_id = event.call_id.trim();
    if external_call_id.is_empty() {
        return Err(AppError::validation("call_id", "call_id must not be empty"));
    }

    let update = interpret_event(&event.event, &event.payload);

    let mut tx = state.db.begin().await?;
    let call = get_or_create_call(
        &mut tx,
        agent.organization_id,
        external_call_id,
        Some(agent.agent_id),
    )
    .await?;
    let applied = apply_call_update(&mut tx, call.id, &update).await?;

    let ack = WebhookAck {
        call_id: Some(call.id),
        event: event.event.clone(),
        applied,
    };
    audit::record(
        &mut tx,
        ToolCallEntry::success(
            Some(agent.organization_id),
            Some(call.id),
            tool_name,
            request,
            to_audit_value(&ack)?,
        ),
    )
    .await?;
    tx.commit().await?;

    tracing::debug!(
        call_id = %call.id,
        event = %event.event,
        applied,
        "webhook event processed"
    );
    Ok(ack)
}

/// No agent could be found for the event. It is still audited, without tenant.
async fn record_unresolved(
    state: &AppState,
    event: &VoiceEvent,
    tool_name: &str,
    request: &Value,
) -> Result<WebhookAck, AppError> {
    tracing::warn!(
        event = %event.event,
        external_call_id = %event.call_id,
        "webhook event has no resolvable tenant; audited only"
    );
    let ack = WebhookAck {
        call_id: None,
        event: event.event.clone(),
        applied: false,
    };
    let mut tx = state.db.begin().await?;
    audit::record(
        &mut tx,
        ToolCallEntry::success(None, None, tool_name, request, to_audit_value(&ack)?),
    )
    .await?;
    tx.commit().await?;
    Ok(ack)
}
