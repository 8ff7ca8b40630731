use clap::Subcommand;
use serde_json::json;
use sqlx::PgPool;
use voxlead_core::tools::MemberRole;

use crate::util::{connect_db, exit_error, print_json};

#[derive(Subcommand)]
pub enum OrgCommands {
    /// Create an organization (requires DATABASE_URL)
    Create {
        /// Display name
        #[arg(long)]
        name: String,
        /// URL-safe identifier; derived from the name when omitted
        #[arg(long)]
        slug: Option<String>,
        /// Business context JSON handed to agents (offer, hours, tone)
        #[arg(long)]
        business_context: Option<String>,
    },
    /// Add a member to an organization (requires DATABASE_URL)
    AddMember {
        #[arg(long)]
        org_id: uuid::Uuid,
        #[arg(long)]
        email: String,
        /// owner, admin or member
        #[arg(long, default_value = "member", value_parser = parse_role)]
        role: MemberRole,
    },
}

fn parse_role(raw: &str) -> Result<MemberRole, String> {
    MemberRole::parse(raw.trim()).ok_or_else(|| {
        let allowed: Vec<_> = MemberRole::ALL.iter().map(|r| r.as_str()).collect();
        format!("unknown role '{raw}', expected one of: {}", allowed.join(", "))
    })
}

pub async fn run(command: OrgCommands) -> i32 {
    match command {
        OrgCommands::Create {
            name,
            slug,
            business_context,
        } => create(&name, slug.as_deref(), business_context.as_deref()).await,
        OrgCommands::AddMember {
            org_id,
            email,
            role,
        } => {
            let email = email.trim().to_lowercase();
            if !email.contains('@') {
                exit_error(&format!("'{email}' is not an email address"), None);
            }
            let pool = connect_db().await;
            match add_member(&pool, org_id, &email, role).await {
                Ok(member_id) => {
                    print_json(&json!({
                        "member_id": member_id,
                        "organization_id": org_id,
                        "email": email,
                        "role": role.as_str(),
                    }));
                    0
                }
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => exit_error(
                    &format!("{email} is already a member of organization {org_id}"),
                    None,
                ),
                Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                    exit_error(&format!("Organization {org_id} not found"), None)
                }
                Err(e) => exit_error(&format!("Failed to add member: {e}"), None),
            }
        }
    }
}

async fn add_member(
    pool: &PgPool,
    org_id: uuid::Uuid,
    email: &str,
    role: MemberRole,
) -> Result<uuid::Uuid, sqlx::Error> {
    let member_id = uuid::Uuid::now_v7();
    sqlx::query(
        "INSERT INTO organization_members (id, organization_id, email, role) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(member_id)
    .bind(org_id)
    .bind(email)
    .bind(role.as_str())
    .execute(pool)
    .await?;
    Ok(member_id)
}

async fn create(name: &str, slug: Option<&str>, business_context: Option<&str>) -> i32 {
    let slug = slug.map(str::to_string).unwrap_or_else(|| slugify(name));
    if slug.is_empty() {
        exit_error(
            "Could not derive a slug from the organization name",
            Some("Pass --slug explicitly"),
        );
    }

    let context: serde_json::Value = match business_context {
        Some(raw) => match serde_json::from_str(raw) {
            Ok(v @ serde_json::Value::Object(_)) => v,
            Ok(_) => exit_error("--business-context must be a JSON object", None),
            Err(e) => exit_error(&format!("Invalid JSON in --business-context: {e}"), None),
        },
        None => json!({}),
    };

    let pool = connect_db().await;
    let org_id = uuid::Uuid::now_v7();

    let created_at: chrono::DateTime<chrono::Utc> = match sqlx::query_scalar(
        "INSERT INTO organizations (id, name, slug, business_context) \
         VALUES ($1, $2, $3, $4) RETURNING created_at",
    )
    .bind(org_id)
    .bind(name)
    .bind(&slug)
    .bind(&context)
    .fetch_one(&pool)
    .await
    {
        Ok(ts) => ts,
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => exit_error(
            &format!("Organization slug '{slug}' is already taken"),
            Some("Pass a different --slug"),
        ),
        Err(e) => exit_error(&format!("Failed to create organization: {e}"), None),
    };

    print_json(&json!({
        "organization_id": org_id,
        "name": name,
        "slug": slug,
        "created_at": created_at,
    }));
    0
}

/// Lowercase ASCII alphanumerics joined by single dashes.
fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::tests::{db_pool_if_available, insert_org};

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Smith & Sons  Plumbing"), "smith-sons-plumbing");
        assert_eq!(slugify("  --  "), "");
    }

    #[test]
    fn unknown_role_lists_the_allowed_ones() {
        assert_eq!(parse_role("admin"), Ok(MemberRole::Admin));
        let err = parse_role("root").unwrap_err();
        assert!(err.contains("owner, admin, member"), "{err}");
    }

    #[tokio::test]
    async fn member_email_is_unique_per_organization() {
        let Some(pool) = db_pool_if_available().await else {
            return;
        };
        let org = insert_org(&pool).await;
        add_member(&pool, org, "ops@example.com", MemberRole::Owner)
            .await
            .expect("first insert should succeed");
        let err = add_member(&pool, org, "ops@example.com", MemberRole::Member)
            .await
            .unwrap_err();
        assert!(matches!(err, sqlx::Error::Database(db) if db.is_unique_violation()));

        let other = insert_org(&pool).await;
        add_member(&pool, other, "ops@example.com", MemberRole::Member)
            .await
            .expect("same email in another organization is allowed");
    }
}
