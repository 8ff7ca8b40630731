//! Voice-platform management API: upsert tools by name, then attach them to an assistant.

use serde::Serialize;
use serde_json::{Value, json};
use url::Url;

use crate::util::{client, endpoint};

pub const DEFAULT_BASE_URL: &str = "https://api.vapi.ai";

pub struct VapiClient {
    http: reqwest::Client,
    base: Url,
    token: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SyncedTool {
    pub name: String,
    pub id: String,
    pub created: bool,
}

#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub assistant_id: String,
    pub tools: Vec<SyncedTool>,
}

impl VapiClient {
    pub fn new(base: Url, token: &str) -> Self {
        Self {
            http: client(),
            base,
            token: token.to_string(),
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, Box<dyn std::error::Error>> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("voice platform returned {status}: {body}").into());
        }
        Ok(response.json().await?)
    }

    pub async fn list_tools(&self) -> Result<Vec<Value>, Box<dyn std::error::Error>> {
        let body = self
            .send(self.http.get(endpoint(&self.base, "/tool")))
            .await?;
        match body {
            Value::Array(tools) => Ok(tools),
            other => Err(format!("expected a tool list, got {other}").into()),
        }
    }

    /// Update the tool with the same name if one exists, otherwise create it.
    async fn upsert_tool(
        &self,
        existing: &[Value],
        tool: &Value,
    ) -> Result<SyncedTool, Box<dyn std::error::Error>> {
        let name = tool["name"].as_str().unwrap_or_default().to_string();
        let found = existing
            .iter()
            .find(|t| t["name"].as_str() == Some(name.as_str()))
            .and_then(|t| t["id"].as_str());

        let (id, created) = match found {
            Some(id) => {
                tracing::info!(%name, %id, "updating voice-platform tool");
                self.send(
                    self.http
                        .patch(endpoint(&self.base, &format!("/tool/{id}")))
                        .json(tool),
                )
                .await?;
                (id.to_string(), false)
            }
            None => {
                tracing::info!(%name, "creating voice-platform tool");
                let body = self
                    .send(self.http.post(endpoint(&self.base, "/tool")).json(tool))
                    .await?;
                let id = body["id"]
                    .as_str()
                    .ok_or_else(|| format!("created tool {name} has no id"))?;
                (id.to_string(), true)
            }
        };
        Ok(SyncedTool { name, id, created })
    }

    /// Point the assistant's model at `tool_ids`, keeping the rest of its model config.
    async fn attach_tools(
        &self,
        assistant_id: &str,
        tool_ids: &[String],
    ) -> Result<(), Box<dyn std::error::Error>> {
        let path = format!("/assistant/{assistant_id}");
        let assistant = self
            .send(self.http.get(endpoint(&self.base, &path)))
            .await?;

        let mut model = match assistant.get("model") {
            Some(Value::Object(model)) => model.clone(),
            _ => serde_json::Map::new(),
        };
        model.insert("toolIds".to_string(), json!(tool_ids));

        self.send(
            self.http
                .patch(endpoint(&self.base, &path))
                .json(&json!({ "model": model })),
        )
        .await?;
        Ok(())
    }

    pub async fn sync(
        &self,
        assistant_id: &str,
        tools: &[Value],
    ) -> Result<SyncReport, Box<dyn std::error::Error>> {
        let existing = self.list_tools().await?;
        let mut synced = Vec::with_capacity(tools.len());
        for tool in tools {
            synced.push(self.upsert_tool(&existing, tool).await?);
        }

        let ids: Vec<String> = synced.iter().map(|t| t.id.clone()).collect();
        self.attach_tools(assistant_id, &ids).await?;
        tracing::info!(assistant_id, count = ids.len(), "tools attached to assistant");

        Ok(SyncReport {
            assistant_id: assistant_id.to_string(),
            tools: synced,
        })
    }
}
