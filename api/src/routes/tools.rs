use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;
use voxlead_core::error::{ApiEnvelope, ErrorData};
use voxlead_core::normalize::normalize_phone;
use voxlead_core::qualification::score_qualification;
use voxlead_core::tools::{
    FitCheckSaveRequest, FitCheckSaveResponse, HANDOFF_INSTRUCTION, HandoffRequest,
    HandoffResponse, HandoffStatus, HandoffStatusUpdateRequest, HandoffStatusUpdateResponse,
    OutcomeLogRequest, OutcomeLogResponse, QualifyRequest, QualifyResponse, UpsertLeadRequest,
    UpsertLeadResponse, names,
};

use crate::aggregate::{
    self, CallRecord, LeadFields, attach_lead_if_unset, ensure_lead_in_org, get_or_create_call,
};
use crate::audit::{self, ToolCallEntry, to_audit_value};
use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;
use crate::tenant::AuthenticatedAgent;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tools/leads/upsert", post(upsert_lead))
        .route("/api/tools/fit-check/save", post(save_fit_check))
        .route("/api/tools/qualification/score", post(score_lead))
        .route("/api/tools/outcome/log", post(log_outcome))
        .route("/api/tools/handoff/request", post(request_handoff))
        .route(
            "/api/tools/handoff/{handoff_id}/status",
            post(update_handoff_status),
        )
}

fn require_call_id(call_id: &str) -> Result<&str, AppError> {
    let trimmed = call_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("call_id", "call_id must not be empty"));
    }
    Ok(trimmed)
}

/// Call plus lead attachment shared by every tool that names both.
async fn call_for_lead(
    tx: &mut Transaction<'_, Postgres>,
    agent: &AuthenticatedAgent,
    external_call_id: &str,
    lead_id: Uuid,
) -> Result<CallRecord, AppError> {
    ensure_lead_in_org(tx, agent.organization_id, lead_id).await?;
    let call = get_or_create_call(
        tx,
        agent.organization_id,
        external_call_id,
        Some(agent.agent_id),
    )
    .await?;
    if call.lead_id.is_none() {
        attach_lead_if_unset(tx, call.id, lead_id).await?;
    }
    Ok(call)
}

/// Create or update the caller as a lead, keyed by phone number
#[utoipa::path(
    post,
    path = "/api/tools/leads/upsert",
    request_body = UpsertLeadRequest,
    responses(
        (status = 200, description = "Lead created or updated", body = ApiEnvelope<UpsertLeadResponse>),
        (status = 400, description = "Validation error", body = ApiEnvelope<ErrorData>),
        (status = 401, description = "Missing or invalid agent key", body = ApiEnvelope<ErrorData>)
    ),
    security(("api_key" = [])),
    tag = "tools"
)]
pub async fn upsert_lead(
    State(state): State<AppState>,
    agent: AuthenticatedAgent,
    AppJson(req): AppJson<UpsertLeadRequest>,
) -> Result<Json<ApiEnvelope<UpsertLeadResponse>>, AppError> {
    let request = to_audit_value(&req)?;
    let result = upsert_lead_tx(&state, &agent, &req, &request).await;
    let response = audit::on_failure(
        &state.db,
        Some(agent.organization_id),
        names::UPSERT_LEAD,
        &request,
        result,
    )
    .await?;
    Ok(Json(ApiEnvelope::ok("Lead saved", response)))
}

async fn upsert_lead_tx(
    state: &AppState,
    agent: &AuthenticatedAgent,
    req: &UpsertLeadRequest,
    request: &Value,
) -> Result<UpsertLeadResponse, AppError> {
    let phone = normalize_phone(&req.phone).ok_or_else(|| AppError::Validation {
        message: "phone could not be normalized to a dialable number".to_string(),
        field: Some("phone".to_string()),
        received: Some(Value::String(req.phone.clone())),
        docs_hint: Some("Send the caller's number, e.g. 07123456789 or +447123456789.".to_string()),
    })?;
    let external_call_id = req
        .call_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    let mut tx = state.db.begin().await?;

    let call = match external_call_id {
        Some(id) => Some(
            get_or_create_call(&mut tx, agent.organization_id, id, Some(agent.agent_id)).await?,
        ),
        None => None,
    };

    let fields = LeadFields {
        name: req.name.as_deref(),
        business_name: req.business_name.as_deref(),
        role: req.role.as_deref(),
        email: req.email.as_deref(),
        industry: req.industry.as_deref(),
        location: req.location.as_deref(),
        source: req.source,
        notes: req.notes.as_deref(),
    };
    let (lead_id, status) =
        aggregate::upsert_lead(&mut tx, agent.organization_id, &phone, &fields).await?;

    if let Some(call) = call.as_ref().filter(|call| call.lead_id.is_none()) {
        attach_lead_if_unset(&mut tx, call.id, lead_id).await?;
    }

    let response = UpsertLeadResponse { lead_id, status };
    audit::record(
        &mut tx,
        ToolCallEntry::success(
            Some(agent.organization_id),
            call.as_ref().map(|c| c.id),
            names::UPSERT_LEAD,
            request,
            to_audit_value(&response)?,
        ),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        agent_id = %agent.agent_id,
        agent = %agent.name,
        lead_id = %lead_id,
        status = ?status,
        "lead upserted"
    );
    Ok(response)
}

/// Record the fit-check answers gathered on a call
#[utoipa::path(
    post,
    path = "/api/tools/fit-check/save",
    request_body = FitCheckSaveRequest,
    responses(
        (status = 200, description = "Fit check saved", body = ApiEnvelope<FitCheckSaveResponse>),
        (status = 400, description = "Validation error", body = ApiEnvelope<ErrorData>),
        (status = 401, description = "Missing or invalid agent key", body = ApiEnvelope<ErrorData>),
        (status = 404, description = "Lead not found", body = ApiEnvelope<ErrorData>)
    ),
    security(("api_key" = [])),
    tag = "tools"
)]
pub async fn save_fit_check(
    State(state): State<AppState>,
    agent: AuthenticatedAgent,
    AppJson(req): AppJson<FitCheckSaveRequest>,
) -> Result<Json<ApiEnvelope<FitCheckSaveResponse>>, AppError> {
    let request = to_audit_value(&req)?;
    let result = save_fit_check_tx(&state, &agent, &req, &request).await;
    let response = audit::on_failure(
        &state.db,
        Some(agent.organization_id),
        names::SAVE_FIT_CHECK,
        &request,
        result,
    )
    .await?;
    Ok(Json(ApiEnvelope::ok("Fit check saved", response)))
}

async fn save_fit_check_tx(
    state: &AppState,
    agent: &AuthenticatedAgent,
    req: &FitCheckSaveRequest,
    request: &Value,
) -> Result<FitCheckSaveResponse, AppError> {
    let external_call_id = require_call_id(&req.call_id)?;
    let mut tx = state.db.begin().await?;
    let call = call_for_lead(&mut tx, agent, external_call_id, req.lead_id).await?;

    let fit_check_id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO fit_checks \
             (id, call_id, lead_id, business_offer, lead_sources, weekly_enquiries, \
              response_speed, booking_method, has_followup_system, capacity_next_weeks, \
              primary_intent) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(fit_check_id)
    .bind(call.id)
    .bind(req.lead_id)
    .bind(req.business_offer.as_deref())
    .bind(req.lead_sources.as_deref())
    .bind(req.weekly_enquiries.as_deref())
    .bind(req.response_speed.map(|s| s.as_str()))
    .bind(req.booking_method.as_deref())
    .bind(req.has_followup_system)
    .bind(req.capacity_next_weeks)
    .bind(req.primary_intent.map(|i| i.as_str()))
    .execute(&mut *tx)
    .await?;

    let response = FitCheckSaveResponse { fit_check_id };
    audit::record(
        &mut tx,
        ToolCallEntry::success(
            Some(agent.organization_id),
            Some(call.id),
            names::SAVE_FIT_CHECK,
            request,
            to_audit_value(&response)?,
        ),
    )
    .await?;
    tx.commit().await?;
    Ok(response)
}

/// Score the lead and recommend the agent's next move
#[utoipa::path(
    post,
    path = "/api/tools/qualification/score",
    request_body = QualifyRequest,
    responses(
        (status = 200, description = "Lead scored", body = ApiEnvelope<QualifyResponse>),
        (status = 400, description = "Validation error", body = ApiEnvelope<ErrorData>),
        (status = 401, description = "Missing or invalid agent key", body = ApiEnvelope<ErrorData>),
        (status = 404, description = "Lead not found", body = ApiEnvelope<ErrorData>)
    ),
    security(("api_key" = [])),
    tag = "tools"
)]
pub async fn score_lead(
    State(state): State<AppState>,
    agent: AuthenticatedAgent,
    AppJson(req): AppJson<QualifyRequest>,
) -> Result<Json<ApiEnvelope<QualifyResponse>>, AppError> {
    let request = to_audit_value(&req)?;
    let result = score_lead_tx(&state, &agent, &req, &request).await;
    let response = audit::on_failure(
        &state.db,
        Some(agent.organization_id),
        names::QUALIFY_AND_TAG,
        &request,
        result,
    )
    .await?;
    Ok(Json(ApiEnvelope::ok("Lead qualified", response)))
}

async fn score_lead_tx(
    state: &AppState,
    agent: &AuthenticatedAgent,
    req: &QualifyRequest,
    request: &Value,
) -> Result<QualifyResponse, AppError> {
    let external_call_id = require_call_id(&req.call_id)?;
    let scored = score_qualification(req.diagnosis_tag, req.one_sentence_summary.as_deref());

    let mut tx = state.db.begin().await?;
    let call = call_for_lead(&mut tx, agent, external_call_id, req.lead_id).await?;

    let qualification_id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO qualifications \
             (id, call_id, lead_id, diagnosis_tag, one_sentence_summary, notes, score, \
              recommended_action) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(qualification_id)
    .bind(call.id)
    .bind(req.lead_id)
    .bind(req.diagnosis_tag.map(|t| t.as_str()))
    .bind(req.one_sentence_summary.as_deref())
    .bind(req.notes.as_deref())
    .bind(scored.score)
    .bind(scored.recommended_action.as_str())
    .execute(&mut *tx)
    .await?;

    let response = QualifyResponse {
        qualification_id,
        score: scored.score,
        recommended_action: scored.recommended_action,
    };
    audit::record(
        &mut tx,
        ToolCallEntry::success(
            Some(agent.organization_id),
            Some(call.id),
            names::QUALIFY_AND_TAG,
            request,
            to_audit_value(&response)?,
        ),
    )
    .await?;
    tx.commit().await?;
    Ok(response)
}

/// Record the call's final outcome tag and note
#[utoipa::path(
    post,
    path = "/api/tools/outcome/log",
    request_body = OutcomeLogRequest,
    responses(
        (status = 200, description = "Outcome logged", body = ApiEnvelope<OutcomeLogResponse>),
        (status = 400, description = "Validation error", body = ApiEnvelope<ErrorData>),
        (status = 401, description = "Missing or invalid agent key", body = ApiEnvelope<ErrorData>)
    ),
    security(("api_key" = [])),
    tag = "tools"
)]
pub async fn log_outcome(
    State(state): State<AppState>,
    agent: AuthenticatedAgent,
    AppJson(req): AppJson<OutcomeLogRequest>,
) -> Result<Json<ApiEnvelope<OutcomeLogResponse>>, AppError> {
    let request = to_audit_value(&req)?;
    let result = log_outcome_tx(&state, &agent, &req, &request).await;
    let response = audit::on_failure(
        &state.db,
        Some(agent.organization_id),
        names::LOG_OUTCOME,
        &request,
        result,
    )
    .await?;
    Ok(Json(ApiEnvelope::ok("Outcome logged", response)))
}

async fn log_outcome_tx(
    state: &AppState,
    agent: &AuthenticatedAgent,
    req: &OutcomeLogRequest,
    request: &Value,
) -> Result<OutcomeLogResponse, AppError> {
    let external_call_id = require_call_id(&req.call_id)?;
    let mut tx = state.db.begin().await?;
    let call = get_or_create_call(
        &mut tx,
        agent.organization_id,
        external_call_id,
        Some(agent.agent_id),
    )
    .await?;

    sqlx::query(
        "UPDATE calls SET outcome_tag = $2, outcome_note = $3, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(call.id)
    .bind(req.outcome_tag.as_str())
    .bind(&req.note)
    .execute(&mut *tx)
    .await?;

    let response = OutcomeLogResponse { ok: true };
    audit::record(
        &mut tx,
        ToolCallEntry::success(
            Some(agent.organization_id),
            Some(call.id),
            names::LOG_OUTCOME,
            request,
            to_audit_value(&response)?,
        ),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        call_id = %call.id,
        outcome_tag = req.outcome_tag.as_str(),
        "call outcome logged"
    );
    Ok(response)
}

/// Queue a warm transfer to a human
#[utoipa::path(
    post,
    path = "/api/tools/handoff/request",
    request_body = HandoffRequest,
    responses(
        (status = 200, description = "Handoff queued", body = ApiEnvelope<HandoffResponse>),
        (status = 400, description = "Validation error", body = ApiEnvelope<ErrorData>),
        (status = 401, description = "Missing or invalid agent key", body = ApiEnvelope<ErrorData>),
        (status = 404, description = "Lead not found", body = ApiEnvelope<ErrorData>)
    ),
    security(("api_key" = [])),
    tag = "tools"
)]
pub async fn request_handoff(
    State(state): State<AppState>,
    agent: AuthenticatedAgent,
    AppJson(req): AppJson<HandoffRequest>,
) -> Result<Json<ApiEnvelope<HandoffResponse>>, AppError> {
    let request = to_audit_value(&req)?;
    let result = request_handoff_tx(&state, &agent, &req, &request).await;
    let response = audit::on_failure(
        &state.db,
        Some(agent.organization_id),
        names::HANDOFF_REQUEST,
        &request,
        result,
    )
    .await?;
    Ok(Json(ApiEnvelope::ok("Handoff requested", response)))
}

async fn request_handoff_tx(
    state: &AppState,
    agent: &AuthenticatedAgent,
    req: &HandoffRequest,
    request: &Value,
) -> Result<HandoffResponse, AppError> {
    let external_call_id = require_call_id(&req.call_id)?;
    if req.reason.trim().is_empty() {
        return Err(AppError::validation("reason", "reason must not be empty"));
    }
    let target_phone = req.target_phone.as_deref().and_then(normalize_phone);

    let mut tx = state.db.begin().await?;
    let call = call_for_lead(&mut tx, agent, external_call_id, req.lead_id).await?;

    let handoff_id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO handoffs (id, call_id, lead_id, reason, target_phone, status) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(handoff_id)
    .bind(call.id)
    .bind(req.lead_id)
    .bind(&req.reason)
    .bind(target_phone.as_deref())
    .bind(HandoffStatus::Queued.as_str())
    .execute(&mut *tx)
    .await?;

    let response = HandoffResponse {
        handoff_id,
        status: HandoffStatus::Queued,
        instruction: HANDOFF_INSTRUCTION.to_string(),
    };
    audit::record(
        &mut tx,
        ToolCallEntry::success(
            Some(agent.organization_id),
            Some(call.id),
            names::HANDOFF_REQUEST,
            request,
            to_audit_value(&response)?,
        ),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(call_id = %call.id, handoff_id = %handoff_id, "handoff queued");
    Ok(response)
}

/// Move a queued handoff to completed or cancelled
#[utoipa::path(
    post,
    path = "/api/tools/handoff/{handoff_id}/status",
    params(("handoff_id" = Uuid, Path, description = "Handoff to update")),
    request_body = HandoffStatusUpdateRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiEnvelope<HandoffStatusUpdateResponse>),
        (status = 400, description = "Transition not allowed", body = ApiEnvelope<ErrorData>),
        (status = 401, description = "Missing or invalid agent key", body = ApiEnvelope<ErrorData>),
        (status = 404, description = "Handoff not found", body = ApiEnvelope<ErrorData>)
    ),
    security(("api_key" = [])),
    tag = "tools"
)]
pub async fn update_handoff_status(
    State(state): State<AppState>,
    agent: AuthenticatedAgent,
    Path(handoff_id): Path<Uuid>,
    AppJson(req): AppJson<HandoffStatusUpdateRequest>,
) -> Result<Json<ApiEnvelope<HandoffStatusUpdateResponse>>, AppError> {
    let request = serde_json::json!({ "handoff_id": handoff_id, "status": req.status });
    let result = update_handoff_status_tx(&state, &agent, handoff_id, req.status, &request).await;
    let response = audit::on_failure(
        &state.db,
        Some(agent.organization_id),
        names::HANDOFF_STATUS,
        &request,
        result,
    )
    .await?;
    Ok(Json(ApiEnvelope::ok("Handoff updated", response)))
}

#[derive(sqlx::FromRow)]
struct HandoffRow {
    call_id: Uuid,
    status: String,
}

async fn update_handoff_status_tx(
    state: &AppState,
    agent: &AuthenticatedAgent,
    handoff_id: Uuid,
    next: HandoffStatus,
    request: &Value,
) -> Result<HandoffStatusUpdateResponse, AppError> {
    let mut tx = state.db.begin().await?;
    let row = sqlx::query_as::<_, HandoffRow>(
        "SELECT h.call_id, h.status \
         FROM handoffs h \
         JOIN calls c ON c.id = h.call_id \
         WHERE h.id = $1 AND c.organization_id = $2 \
         FOR UPDATE OF h",
    )
    .bind(handoff_id)
    .bind(agent.organization_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound {
        resource: "Handoff".to_string(),
    })?;

    let previous = HandoffStatus::parse(&row.status).ok_or_else(|| {
        AppError::Internal(format!("handoff {handoff_id} has unknown status '{}'", row.status))
    })?;
    if !previous.can_transition_to(next) {
        return Err(AppError::Validation {
            message: format!(
                "handoff cannot move from {} to {}",
                previous.as_str(),
                next.as_str()
            ),
            field: Some("status".to_string()),
            received: Some(Value::String(next.as_str().to_string())),
            docs_hint: Some("Only queued handoffs can be completed or cancelled.".to_string()),
        });
    }

    sqlx::query("UPDATE handoffs SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(handoff_id)
        .bind(next.as_str())
        .execute(&mut *tx)
        .await?;

    let response = HandoffStatusUpdateResponse {
        handoff_id,
        previous_status: previous,
        status: next,
    };
    audit::record(
        &mut tx,
        ToolCallEntry::success(
            Some(agent.organization_id),
            Some(row.call_id),
            names::HANDOFF_STATUS,
            request,
            to_audit_value(&response)?,
        ),
    )
    .await?;
    tx.commit().await?;
    Ok(response)
}
