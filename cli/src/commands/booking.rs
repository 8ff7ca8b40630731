use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::util::{connect_db, exit_error, print_serialized};

#[derive(Subcommand)]
pub enum BookingCommands {
    /// List bookings recorded against an organization's calls (requires DATABASE_URL)
    List {
        #[arg(long)]
        org_id: Uuid,
        /// Only bookings starting at or after this instant (ISO-8601)
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

pub async fn run(command: BookingCommands) -> i32 {
    match command {
        BookingCommands::List {
            org_id,
            from,
            limit,
        } => {
            if !(1..=500).contains(&limit) {
                exit_error("--limit must be between 1 and 500", None);
            }
            let pool = connect_db().await;
            match list_bookings(&pool, org_id, from, limit).await {
                Ok(bookings) => print_serialized(&bookings),
                Err(e) => exit_error(&format!("Failed to list bookings: {e}"), None),
            }
        }
    }
    0
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct BookingRow {
    pub id: Uuid,
    pub call_id: Uuid,
    pub external_call_id: String,
    pub lead_id: Option<Uuid>,
    pub provider: String,
    pub provider_booking_id: Option<i64>,
    pub provider_uid: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub timezone: Option<String>,
    pub meeting_url: Option<String>,
    pub status: String,
}

/// Bookings are tenant-scoped through their call.
pub async fn list_bookings(
    pool: &PgPool,
    org_id: Uuid,
    from: Option<DateTime<Utc>>,
    limit: i64,
) -> Result<Vec<BookingRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT b.id, b.call_id, c.external_call_id, b.lead_id, b.provider, \
                b.provider_booking_id, b.provider_uid, b.start_at, b.end_at, b.timezone, \
                b.meeting_url, b.status \
         FROM bookings b JOIN calls c ON c.id = b.call_id \
         WHERE c.organization_id = $1 AND ($2::timestamptz IS NULL OR b.start_at >= $2) \
         ORDER BY b.start_at, b.id LIMIT $3",
    )
    .bind(org_id)
    .bind(from)
    .bind(limit)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::util::tests::{db_pool_if_available, insert_org};

    async fn insert_booking(pool: &PgPool, org: Uuid, external: &str, start: DateTime<Utc>) {
        let call_id = Uuid::now_v7();
        sqlx::query("INSERT INTO calls (id, organization_id, external_call_id) VALUES ($1, $2, $3)")
            .bind(call_id)
            .bind(org)
            .bind(external)
            .execute(pool)
            .await
            .expect("call insert should succeed");
        sqlx::query(
            "INSERT INTO bookings (id, call_id, provider, provider_uid, start_at, end_at) \
             VALUES ($1, $2, 'cal.com', $3, $4, $5)",
        )
        .bind(Uuid::now_v7())
        .bind(call_id)
        .bind(format!("uid-{external}"))
        .bind(start)
        .bind(start + chrono::Duration::minutes(15))
        .execute(pool)
        .await
        .expect("booking insert should succeed");
    }

    #[tokio::test]
    async fn bookings_are_scoped_through_calls_and_filtered_by_start() {
        let Some(pool) = db_pool_if_available().await else {
            return;
        };
        let org = insert_org(&pool).await;
        let other = insert_org(&pool).await;
        let early = Utc.with_ymd_and_hms(2026, 1, 27, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 1, 28, 9, 0, 0).unwrap();
        insert_booking(&pool, org, "c-late", late).await;
        insert_booking(&pool, org, "c-early", early).await;
        insert_booking(&pool, other, "c-other", early).await;

        let all = list_bookings(&pool, org, None, 10).await.expect("list should load");
        let uids: Vec<_> = all.iter().map(|b| b.provider_uid.as_deref()).collect();
        assert_eq!(uids, [Some("uid-c-early"), Some("uid-c-late")]);
        assert_eq!(all[0].status, "booked");
        assert_eq!(all[1].end_at - all[1].start_at, chrono::Duration::minutes(15));

        let upcoming = list_bookings(&pool, org, Some(late), 10)
            .await
            .expect("list should load");
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].external_call_id, "c-late");
    }
}
