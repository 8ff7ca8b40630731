use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::util::{connect_db, exit_error, print_serialized};

#[derive(Subcommand)]
pub enum LeadCommands {
    /// List an organization's leads with their call counts (requires DATABASE_URL)
    List {
        #[arg(long)]
        org_id: Uuid,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

pub async fn run(command: LeadCommands) -> i32 {
    match command {
        LeadCommands::List { org_id, limit } => {
            if !(1..=500).contains(&limit) {
                exit_error("--limit must be between 1 and 500", None);
            }
            let pool = connect_db().await;
            match list_leads(&pool, org_id, limit).await {
                Ok(leads) => print_serialized(&leads),
                Err(e) => exit_error(&format!("Failed to list leads: {e}"), None),
            }
        }
    }
    0
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct LeadRow {
    pub id: Uuid,
    pub phone: String,
    pub name: Option<String>,
    pub business_name: Option<String>,
    pub email: Option<String>,
    pub source: String,
    pub call_count: i64,
    pub last_call_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

pub async fn list_leads(
    pool: &PgPool,
    org_id: Uuid,
    limit: i64,
) -> Result<Vec<LeadRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT l.id, l.phone, l.name, l.business_name, l.email, l.source, \
                COUNT(c.id) AS call_count, MAX(c.created_at) AS last_call_at, l.updated_at \
         FROM leads l LEFT JOIN calls c ON c.lead_id = l.id \
         WHERE l.organization_id = $1 \
         GROUP BY l.id \
         ORDER BY l.updated_at DESC, l.id DESC LIMIT $2",
    )
    .bind(org_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}
