use clap::{Args, Subcommand};
use serde_json::{Value, json};
use url::Url;
use voxlead_core::auth::{generate_tool_key, key_prefix};
use voxlead_core::tools::{
    AgentUseCase, LeadSource, LeakTag, OutcomeTag, PrimaryIntent, ResponseSpeed, names,
};

use crate::util::{connect_db, endpoint, exit_error, parse_base_url, print_json, print_serialized};
use crate::vapi::{DEFAULT_BASE_URL, VapiClient};

const ASSISTANT_ID_CONSTRAINT: &str = "agents_vapi_assistant_id_key";

#[derive(Subcommand)]
pub enum AgentCommands {
    /// Create an agent and print its tool key once (requires DATABASE_URL)
    Create {
        /// Owning organization UUID
        #[arg(long)]
        org_id: uuid::Uuid,
        /// Display name
        #[arg(long)]
        name: String,
        /// lead_qualification, appointment_booking, support or custom
        #[arg(long, default_value = "lead_qualification", value_parser = parse_use_case)]
        use_case: AgentUseCase,
        /// Voice-platform assistant id, used to route keyless webhook events
        #[arg(long)]
        assistant_id: Option<String>,
        /// Per-agent Cal.com API key
        #[arg(long, env = "AGENT_CAL_COM_API_KEY")]
        cal_com_api_key: Option<String>,
        /// Per-agent Cal.com event type id
        #[arg(long)]
        cal_com_event_type_id: Option<i64>,
        #[command(flatten)]
        persona: Persona,
    },
    /// Print voice-platform tool definitions bound to a base URL and key,
    /// or push them to the platform with --sync
    Tools {
        /// Public base URL the voice platform calls
        #[arg(long, env = "SERVER_BASE_URL")]
        base_url: String,
        /// Agent tool key sent as x-api-key
        #[arg(long, env = "VOXLEAD_TOOL_KEY")]
        api_key: String,
        /// Upsert the tools by name and attach them to the assistant
        #[arg(long)]
        sync: bool,
        /// Assistant to attach the tools to (with --sync)
        #[arg(long, env = "VAPI_ASSISTANT_ID")]
        assistant_id: Option<String>,
        /// Voice-platform management token (with --sync)
        #[arg(long, env = "VAPI_API_TOKEN", hide_env_values = true)]
        vapi_token: Option<String>,
        #[arg(long, env = "VAPI_BASE_URL", default_value = DEFAULT_BASE_URL)]
        vapi_base_url: String,
    },
}

/// Assistant persona stored with the agent for reference when configuring the platform.
#[derive(Args, Debug, Default)]
pub struct Persona {
    #[arg(long)]
    system_prompt: Option<String>,
    #[arg(long)]
    first_message: Option<String>,
    /// LLM model name, e.g. gpt-4o
    #[arg(long)]
    model: Option<String>,
    /// Voice id on the voice platform
    #[arg(long)]
    voice: Option<String>,
}

fn parse_use_case(raw: &str) -> Result<AgentUseCase, String> {
    AgentUseCase::parse(raw.trim()).ok_or_else(|| {
        let allowed: Vec<_> = AgentUseCase::ALL.iter().map(|u| u.as_str()).collect();
        format!("unknown use case '{raw}', expected one of: {}", allowed.join(", "))
    })
}

pub async fn run(command: AgentCommands) -> i32 {
    match command {
        AgentCommands::Create {
            org_id,
            name,
            use_case,
            assistant_id,
            cal_com_api_key,
            cal_com_event_type_id,
            persona,
        } => {
            create(
                org_id,
                &name,
                use_case,
                assistant_id.as_deref(),
                cal_com_api_key.as_deref(),
                cal_com_event_type_id,
                &persona,
            )
            .await
        }
        AgentCommands::Tools {
            base_url,
            api_key,
            sync,
            assistant_id,
            vapi_token,
            vapi_base_url,
        } => {
            if api_key.trim().is_empty() {
                exit_error("--api-key must not be empty", None);
            }
            let tools = tool_definitions(&parse_base_url(&base_url), &api_key);
            if !sync {
                print_json(&Value::Array(tools));
                return 0;
            }

            let (Some(assistant_id), Some(token)) = (assistant_id, vapi_token) else {
                exit_error(
                    "--sync needs --assistant-id and --vapi-token",
                    Some("Or set VAPI_ASSISTANT_ID and VAPI_API_TOKEN"),
                );
            };
            let vapi = VapiClient::new(parse_base_url(&vapi_base_url), &token);
            match vapi.sync(&assistant_id, &tools).await {
                Ok(report) => {
                    print_serialized(&report);
                    0
                }
                Err(e) => exit_error(&format!("Tool sync failed: {e}"), None),
            }
        }
    }
}

async fn create(
    org_id: uuid::Uuid,
    name: &str,
    use_case: AgentUseCase,
    assistant_id: Option<&str>,
    cal_com_api_key: Option<&str>,
    cal_com_event_type_id: Option<i64>,
    persona: &Persona,
) -> i32 {
    let pool = connect_db().await;

    let org_exists: bool =
        match sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM organizations WHERE id = $1)")
            .bind(org_id)
            .fetch_one(&pool)
            .await
        {
            Ok(exists) => exists,
            Err(e) => exit_error(&format!("Failed to look up organization: {e}"), None),
        };
    if !org_exists {
        exit_error(
            &format!("Organization {org_id} not found"),
            Some("Create it first with: voxlead org create --name <name>"),
        );
    }

    let (tool_key, key_hash) = generate_tool_key();
    let prefix = key_prefix(&tool_key);
    let agent_id = uuid::Uuid::now_v7();

    if let Err(e) = sqlx::query(
        "INSERT INTO agents \
             (id, organization_id, name, use_case, system_prompt, first_message, model, voice, \
              vapi_assistant_id, tool_key_hash, tool_key_prefix, cal_com_api_key, \
              cal_com_event_type_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(agent_id)
    .bind(org_id)
    .bind(name)
    .bind(use_case.as_str())
    .bind(persona.system_prompt.as_deref())
    .bind(persona.first_message.as_deref())
    .bind(persona.model.as_deref())
    .bind(persona.voice.as_deref())
    .bind(assistant_id)
    .bind(&key_hash)
    .bind(&prefix)
    .bind(cal_com_api_key)
    .bind(cal_com_event_type_id)
    .execute(&pool)
    .await
    {
        let (message, hint) = insert_failure(&e);
        exit_error(&message, hint);
    }

    print_json(&json!({
        "agent_id": agent_id,
        "organization_id": org_id,
        "name": name,
        "use_case": use_case.as_str(),
        "tool_key": tool_key,
        "tool_key_prefix": prefix,
        "calendar_configured": cal_com_api_key.is_some(),
        "warning": "Store this key now. It cannot be retrieved again."
    }));
    0
}

/// Operator-facing message for a failed agent insert.
fn insert_failure(err: &sqlx::Error) -> (String, Option<&'static str>) {
    match err {
        sqlx::Error::Database(db)
            if db.is_unique_violation() && db.constraint() == Some(ASSISTANT_ID_CONSTRAINT) =>
        {
            (
                "Assistant id is already linked to another agent".to_string(),
                Some("Each voice-platform assistant maps to exactly one agent"),
            )
        }
        sqlx::Error::Database(db) if db.is_unique_violation() => (
            format!(
                "Agent conflicts with an existing row ({})",
                db.constraint().unwrap_or("unique constraint")
            ),
            Some("Run the command again"),
        ),
        e => (format!("Failed to create agent: {e}"), None),
    }
}

fn wire_names<T: Copy>(all: &[T], as_str: fn(T) -> &'static str) -> Vec<&'static str> {
    all.iter().copied().map(as_str).collect()
}

fn api_request_tool(name: &str, method: &str, url: String, api_key: &str, body: Value) -> Value {
    json!({
        "type": "apiRequest",
        "function": { "name": "api_request_tool" },
        "name": name,
        "method": method,
        "url": url,
        "headers": {
            "type": "object",
            "properties": {
                "x-api-key": { "type": "string", "value": api_key }
            }
        },
        "body": body
    })
}

/// Tool definitions in the voice platform's `apiRequest` format, one per
/// endpoint the agent may call mid-conversation.
pub fn tool_definitions(base: &Url, api_key: &str) -> Vec<Value> {
    let url = |path: &str| endpoint(base, path);

    vec![
        api_request_tool(
            names::UPSERT_LEAD,
            "POST",
            url("/api/tools/leads/upsert"),
            api_key,
            json!({
                "type": "object",
                "properties": {
                    "call_id": { "type": "string", "description": "Voice platform call id" },
                    "phone": { "type": "string" },
                    "name": { "type": "string" },
                    "business_name": { "type": "string" },
                    "role": { "type": "string" },
                    "email": { "type": "string" },
                    "industry": { "type": "string" },
                    "location": { "type": "string" },
                    "source": {
                        "type": "string",
                        "enum": wire_names(LeadSource::ALL, LeadSource::as_str)
                    },
                    "notes": { "type": "string" }
                },
                "required": ["call_id", "phone"]
            }),
        ),
        api_request_tool(
            names::SAVE_FIT_CHECK,
            "POST",
            url("/api/tools/fit-check/save"),
            api_key,
            json!({
                "type": "object",
                "properties": {
                    "call_id": { "type": "string" },
                    "lead_id": { "type": "string", "format": "uuid" },
                    "business_offer": { "type": "string" },
                    "lead_sources": { "type": "array", "items": { "type": "string" } },
                    "weekly_enquiries": { "type": "string" },
                    "response_speed": {
                        "type": "string",
                        "enum": wire_names(ResponseSpeed::ALL, ResponseSpeed::as_str)
                    },
                    "booking_method": { "type": "string" },
                    "has_followup_system": { "type": "boolean" },
                    "capacity_next_weeks": { "type": "boolean" },
                    "primary_intent": {
                        "type": "string",
                        "enum": wire_names(PrimaryIntent::ALL, PrimaryIntent::as_str)
                    }
                },
                "required": ["call_id", "lead_id"]
            }),
        ),
        api_request_tool(
            names::QUALIFY_AND_TAG,
            "POST",
            url("/api/tools/qualification/score"),
            api_key,
            json!({
                "type": "object",
                "properties": {
                    "call_id": { "type": "string" },
                    "lead_id": { "type": "string", "format": "uuid" },
                    "diagnosis_tag": {
                        "type": "string",
                        "enum": wire_names(LeakTag::ALL, LeakTag::as_str)
                    },
                    "one_sentence_summary": { "type": "string" },
                    "notes": { "type": "string" }
                },
                "required": ["call_id", "lead_id"]
            }),
        ),
        api_request_tool(
            names::LOG_OUTCOME,
            "POST",
            url("/api/tools/outcome/log"),
            api_key,
            json!({
                "type": "object",
                "properties": {
                    "call_id": { "type": "string" },
                    "lead_id": { "type": "string", "format": "uuid" },
                    "outcome_tag": {
                        "type": "string",
                        "enum": wire_names(OutcomeTag::ALL, OutcomeTag::as_str)
                    },
                    "note": { "type": "string" }
                },
                "required": ["call_id", "outcome_tag", "note"]
            }),
        ),
        api_request_tool(
            names::HANDOFF_REQUEST,
            "POST",
            url("/api/tools/handoff/request"),
            api_key,
            json!({
                "type": "object",
                "properties": {
                    "call_id": { "type": "string" },
                    "lead_id": { "type": "string", "format": "uuid" },
                    "reason": { "type": "string" },
                    "target_phone": { "type": "string" }
                },
                "required": ["call_id", "lead_id", "reason"]
            }),
        ),
        api_request_tool(
            names::GET_AVAILABILITY,
            "GET",
            format!("{}?start={{{{start}}}}&end={{{{end}}}}", url("/api/bookings/availability")),
            api_key,
            json!({
                "type": "object",
                "properties": {
                    "start": { "type": "string" },
                    "end": { "type": "string" }
                },
                "required": ["start", "end"]
            }),
        ),
        api_request_tool(
            names::BOOK_AUDIT,
            "POST",
            url("/api/bookings"),
            api_key,
            json!({
                "type": "object",
                "properties": {
                    "email": { "type": "string" },
                    "name": { "type": "string" },
                    "phoneNumber": { "type": "string" },
                    "start": { "type": "string", "format": "date-time" },
                    "end": { "type": "string", "format": "date-time" },
                    "call_id": { "type": "string" },
                    "lead_id": { "type": "string", "format": "uuid" },
                    "attendees": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": { "type": "string" },
                                "email": { "type": "string" },
                                "phoneNumber": { "type": "string" }
                            },
                            "required": ["name", "email"]
                        }
                    }
                },
                "required": ["name", "email", "start", "end"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::tests::{db_pool_if_available, insert_org};

    async fn raw_agent_insert(
        pool: &sqlx::PgPool,
        org: uuid::Uuid,
        assistant_id: &str,
        key_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO agents \
                 (id, organization_id, name, use_case, vapi_assistant_id, tool_key_hash, \
                  tool_key_prefix) \
             VALUES ($1, $2, 'Front desk', 'support', $3, $4, 'vxl_tk_x')",
        )
        .bind(uuid::Uuid::now_v7())
        .bind(org)
        .bind(assistant_id)
        .bind(key_hash)
        .execute(pool)
        .await
        .map(|_| ())
    }

    #[test]
    fn use_case_is_validated_against_the_taxonomy() {
        assert_eq!(
            parse_use_case("appointment_booking"),
            Ok(AgentUseCase::AppointmentBooking)
        );
        let err = parse_use_case("sales").unwrap_err();
        assert!(err.contains("lead_qualification"), "{err}");
    }

    #[tokio::test]
    async fn only_assistant_id_conflicts_blame_the_assistant() {
        let Some(pool) = db_pool_if_available().await else {
            return;
        };
        let org = insert_org(&pool).await;
        let assistant = format!("asst-{}", uuid::Uuid::now_v7());
        let hash = format!("hash-{}", uuid::Uuid::now_v7());
        raw_agent_insert(&pool, org, &assistant, &hash)
            .await
            .expect("first agent should insert");

        let fresh_hash = format!("hash-{}", uuid::Uuid::now_v7());
        let err = raw_agent_insert(&pool, org, &assistant, &fresh_hash)
            .await
            .unwrap_err();
        let (message, _) = insert_failure(&err);
        assert_eq!(message, "Assistant id is already linked to another agent");

        let other_assistant = format!("asst-{}", uuid::Uuid::now_v7());
        let err = raw_agent_insert(&pool, org, &other_assistant, &hash)
            .await
            .unwrap_err();
        let (message, _) = insert_failure(&err);
        assert!(message.contains("agents_tool_key_hash_key"), "{message}");
    }

    fn tools() -> Vec<Value> {
        tool_definitions(&parse_base_url("https://voice.example.com/"), "vxl_tk_test")
    }

    #[test]
    fn every_tool_carries_the_agent_key() {
        let tools = tools();
        assert_eq!(tools.len(), 7);
        for tool in &tools {
            assert_eq!(
                tool["headers"]["properties"]["x-api-key"]["value"],
                "vxl_tk_test"
            );
            assert_eq!(tool["type"], "apiRequest");
        }
    }

    #[test]
    fn urls_are_bound_to_base() {
        let tools = tools();
        assert_eq!(
            tools[0]["url"],
            "https://voice.example.com/api/tools/leads/upsert"
        );
        assert_eq!(
            tools[5]["url"],
            "https://voice.example.com/api/bookings/availability?start={{start}}&end={{end}}"
        );
    }

    #[test]
    fn enums_follow_the_tag_taxonomy() {
        let tools = tools();
        let qualify = tools
            .iter()
            .find(|tool| tool["name"] == names::QUALIFY_AND_TAG)
            .expect("qualify tool present");
        let tags = qualify["body"]["properties"]["diagnosis_tag"]["enum"]
            .as_array()
            .expect("enum list");
        assert_eq!(tags.len(), 5);
        assert!(tags.contains(&json!("#leak-booking")));
    }
}
