//! Activity log models for tracking user actions.
//!
//! Rows are append-only. Nothing in the application updates or deletes them.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool};

/// Activity log entry joined with the actor's display name
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityLog {
    pub id: String,
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub action: String,
    pub target_table: Option<String>,
    pub target_id: Option<String>,
    pub details: Option<String>,
    pub logged_at: String,
    pub actor: Option<String>,
}

/// Data for a new activity log row
#[derive(Debug, Clone, Default)]
pub struct NewActivityLog<'a> {
    pub user_id: Option<&'a str>,
    pub role: Option<&'a str>,
    pub action: &'a str,
    pub target_table: Option<&'a str>,
    pub target_id: Option<String>,
    pub details: Option<serde_json::Value>,
}

/// Response for listing activity logs with pagination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogListResponse {
    pub items: Vec<ActivityLog>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

/// Query parameters for filtering activity logs
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ActivityLogQuery {
    /// Filter by action (e.g., "APPROVE_RECORD")
    pub action: Option<String>,
    /// Filter by target table (e.g., "crop_prices")
    pub target_table: Option<String>,
    pub target_id: Option<String>,
    pub user_id: Option<String>,
    /// Start date for filtering (inclusive, `YYYY-MM-DD[ HH:MM:SS]`)
    pub start_date: Option<String>,
    /// End date for filtering (inclusive)
    pub end_date: Option<String>,
    /// Page number (1-indexed, defaults to 1)
    pub page: Option<i64>,
    /// Items per page (defaults to 50, max 100)
    pub per_page: Option<i64>,
}

/// Action codes written to the activity log
pub mod actions {
    // Auth
    pub const LOGIN_USER: &str = "LOGIN_USER";
    pub const LOGIN_ADMIN: &str = "LOGIN_ADMIN";
    pub const LOGOUT_USER: &str = "LOGOUT_USER";
    pub const REGISTER_USER: &str = "REGISTER_USER";
    pub const CHANGE_PASSWORD: &str = "CHANGE_PASSWORD";

    // Users
    pub const CREATE_USER: &str = "CREATE_USER";
    pub const UPDATE_USER: &str = "UPDATE_USER";
    pub const VERIFY_USER: &str = "VERIFY_USER";
    pub const DELETE_USER: &str = "DELETE_USER";
    pub const ISSUE_TEMPORARY_PASSWORD: &str = "ISSUE_TEMPORARY_PASSWORD";

    // Submissions
    pub const ADD_BARANGAY_YIELD: &str = "ADD_BARANGAY_YIELD";
    pub const UPDATE_BARANGAY_YIELD: &str = "UPDATE_BARANGAY_YIELD";
    pub const DELETE_BARANGAY_YIELD: &str = "DELETE_BARANGAY_YIELD";
    pub const ADD_CROP_PRICE: &str = "ADD_CROP_PRICE";
    pub const UPDATE_CROP_PRICE: &str = "UPDATE_CROP_PRICE";
    pub const DELETE_CROP_PRICE: &str = "DELETE_CROP_PRICE";

    // Review
    pub const APPROVE_RECORD: &str = "APPROVE_RECORD";
    pub const REJECT_RECORD: &str = "REJECT_RECORD";

    // Reference data
    pub const ADD_CROP: &str = "ADD_CROP";
    pub const UPDATE_CROP: &str = "UPDATE_CROP";
    pub const DELETE_CROP: &str = "DELETE_CROP";
    pub const ADD_BARANGAY: &str = "ADD_BARANGAY";
    pub const UPDATE_BARANGAY: &str = "UPDATE_BARANGAY";
    pub const DELETE_BARANGAY: &str = "DELETE_BARANGAY";

    // Backups
    pub const BACKUP_UPLOADED: &str = "BACKUP_UPLOADED";
    pub const BACKUP_DOWNLOADED: &str = "BACKUP_DOWNLOADED";
    pub const BACKUP_DELETED: &str = "BACKUP_DELETED";
}

/// Tables referenced by `target_table`
pub mod target_tables {
    pub const USERS: &str = "users";
    pub const CROPS: &str = "crops";
    pub const BARANGAYS: &str = "barangays";
    pub const BARANGAY_YIELDS: &str = "barangay_yields";
    pub const CROP_PRICES: &str = "crop_prices";
    pub const BACKUPS: &str = "backups";
}

/// Keys never persisted in log details, at any nesting level
const FORBIDDEN_DETAIL_KEYS: &[&str] = &[
    "password",
    "confirmPassword",
    "confirm_password",
    "newPassword",
    "new_password",
    "oldPassword",
    "old_password",
    "currentPassword",
    "current_password",
    "password_hash",
    "token",
];

lazy_static! {
    static ref VULGAR_PATTERNS: Vec<Regex> = [
        r"(?i)\bf+u+c+k+\w*",
        r"(?i)\bmotherf+u+c+k+\w*",
        r"(?i)\bs+h+i+t+\w*",
        r"(?i)\bb+i+t+c+h+\w*",
        r"(?i)\ba+s+s+h*o+l+e+\w*",
        r"(?i)\bp+u+t+a+n*g*\b",
        r"(?i)\bg+a+g+o+\b",
        r"(?i)\bt+a+n+g+\W*i+n+a+\b",
        r"(?i)\bl+e+c+h+e+\b",
        r"(?i)\bp+a+k+y*u+\b",
        r"(?i)\bd+a+m+n+\w*",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();
}

/// Replace vulgar words with asterisks of the same length
pub fn mask_vulgarity(value: &str) -> String {
    let mut masked = value.to_string();
    for pattern in VULGAR_PATTERNS.iter() {
        masked = pattern
            .replace_all(&masked, |caps: &regex::Captures| "*".repeat(caps[0].chars().count()))
            .into_owned();
    }
    masked
}

/// Strip secrets and mask vulgar strings in a details payload
pub fn sanitize_details(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !FORBIDDEN_DETAIL_KEYS.contains(&key.as_str()))
                .map(|(key, v)| (key, sanitize_details(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_details).collect()),
        Value::String(s) => Value::String(mask_vulgarity(&s)),
        other => other,
    }
}

/// Insert an activity log row.
///
/// Generic over the executor so the review workflow can write its entry
/// inside the same transaction as the status change.
pub async fn insert_activity_log<'e, E>(executor: E, entry: &NewActivityLog<'_>) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let id = uuid::Uuid::new_v4().to_string();
    let details_json = entry.details.clone().map(|d| sanitize_details(d).to_string());

    sqlx::query(
        r#"
        INSERT INTO activity_logs (id, user_id, role, action, target_table, target_id, details, logged_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(entry.user_id)
    .bind(entry.role)
    .bind(mask_vulgarity(entry.action))
    .bind(entry.target_table)
    .bind(entry.target_id.as_deref().map(mask_vulgarity))
    .bind(&details_json)
    .bind(crate::utils::now_timestamp())
    .execute(executor)
    .await?;

    tracing::debug!(
        action = entry.action,
        target_table = entry.target_table,
        target_id = entry.target_id.as_deref(),
        user_id = entry.user_id,
        "Activity log recorded"
    );

    Ok(())
}

const SELECT_WITH_ACTOR: &str = r#"
    SELECT l.id, l.user_id, l.role, l.action, l.target_table, l.target_id, l.details, l.logged_at,
           CASE WHEN u.id IS NULL THEN NULL ELSE u.first_name || ' ' || u.last_name END AS actor
    FROM activity_logs l
    LEFT JOIN users u ON u.id = l.user_id
"#;

/// List activity logs with filtering and pagination
pub async fn list_activity_logs(
    db: &SqlitePool,
    query: &ActivityLogQuery,
) -> Result<ActivityLogListResponse, sqlx::Error> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(50).clamp(1, 100);
    let offset = (page - 1).saturating_mul(per_page);

    let mut conditions = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(action) = &query.action {
        conditions.push("l.action = ?");
        bindings.push(action.clone());
    }

    if let Some(target_table) = &query.target_table {
        conditions.push("l.target_table = ?");
        bindings.push(target_table.clone());
    }

    if let Some(target_id) = &query.target_id {
        conditions.push("l.target_id = ?");
        bindings.push(target_id.clone());
    }

    if let Some(user_id) = &query.user_id {
        conditions.push("l.user_id = ?");
        bindings.push(user_id.clone());
    }

    if let Some(start_date) = &query.start_date {
        conditions.push("l.logged_at >= ?");
        bindings.push(start_date.clone());
    }

    if let Some(end_date) = &query.end_date {
        // A bare date covers the whole day
        let end = if end_date.len() == 10 {
            format!("{} 23:59:59", end_date)
        } else {
            end_date.clone()
        };
        conditions.push("l.logged_at <= ?");
        bindings.push(end);
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM activity_logs l {}", where_clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for binding in &bindings {
        count_query = count_query.bind(binding);
    }
    let total = count_query.fetch_one(db).await?;

    let sql = format!(
        "{} {} ORDER BY l.logged_at DESC, l.rowid DESC LIMIT ? OFFSET ?",
        SELECT_WITH_ACTOR, where_clause
    );
    let mut query_builder = sqlx::query_as::<_, ActivityLog>(&sql);
    for binding in &bindings {
        query_builder = query_builder.bind(binding);
    }
    query_builder = query_builder.bind(per_page).bind(offset);

    let items = query_builder.fetch_all(db).await?;

    let total_pages = (total as f64 / per_page as f64).ceil() as i64;

    Ok(ActivityLogListResponse {
        items,
        total,
        page,
        per_page,
        total_pages,
    })
}

/// Every entry written by one user, newest first
pub async fn list_user_activity(db: &SqlitePool, user_id: &str) -> Result<Vec<ActivityLog>, sqlx::Error> {
    let sql = format!(
        "{} WHERE l.user_id = ? ORDER BY l.logged_at DESC, l.rowid DESC",
        SELECT_WITH_ACTOR
    );
    sqlx::query_as(&sql).bind(user_id).fetch_all(db).await
}

pub async fn list_action_codes(db: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT DISTINCT action FROM activity_logs ORDER BY action")
        .fetch_all(db)
        .await
}

pub async fn count_activity_for_target(
    db: &SqlitePool,
    target_table: &str,
    target_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM activity_logs WHERE target_table = ? AND target_id = ?")
        .bind(target_table)
        .bind(target_id)
        .fetch_one(db)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_strips_secrets_recursively() {
        let details = json!({
            "email": "ana@example.com",
            "password": "Secret1!",
            "nested": { "token": "abc", "newPassword": "x", "keep": 1 },
            "list": [{ "confirmPassword": "y", "ok": true }]
        });

        let clean = sanitize_details(details);
        assert!(clean.get("password").is_none());
        assert!(clean["nested"].get("token").is_none());
        assert!(clean["nested"].get("newPassword").is_none());
        assert_eq!(clean["nested"]["keep"], 1);
        assert!(clean["list"][0].get("confirmPassword").is_none());
        assert_eq!(clean["list"][0]["ok"], true);
        assert_eq!(clean["email"], "ana@example.com");
    }

    #[test]
    fn test_mask_vulgarity_preserves_length() {
        assert_eq!(mask_vulgarity("what the fuck"), "what the ****");
        assert_eq!(mask_vulgarity("Damn it"), "**** it");
        assert_eq!(mask_vulgarity("reputation and computer"), "reputation and computer");
        assert_eq!(mask_vulgarity("APPROVE_RECORD"), "APPROVE_RECORD");
    }

    #[tokio::test]
    async fn test_insert_and_filter_logs() {
        let db = crate::db::init_in_memory().await.unwrap();

        for (action, table, id) in [
            (actions::ADD_CROP, target_tables::CROPS, "1"),
            (actions::APPROVE_RECORD, target_tables::CROP_PRICES, "7"),
            (actions::APPROVE_RECORD, target_tables::BARANGAY_YIELDS, "7"),
        ] {
            insert_activity_log(
                &db,
                &NewActivityLog {
                    user_id: Some("u1"),
                    role: Some("admin"),
                    action,
                    target_table: Some(table),
                    target_id: Some(id.to_string()),
                    details: Some(json!({ "password": "nope", "note": "ok" })),
                },
            )
            .await
            .unwrap();
        }

        let all = list_activity_logs(&db, &ActivityLogQuery::default()).await.unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.total_pages, 1);
        assert!(all.items.iter().all(|l| !l.details.as_deref().unwrap().contains("nope")));

        let approvals = list_activity_logs(
            &db,
            &ActivityLogQuery {
                action: Some(actions::APPROVE_RECORD.into()),
                target_table: Some(target_tables::CROP_PRICES.into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(approvals.total, 1);
        assert_eq!(approvals.items[0].target_id.as_deref(), Some("7"));

        let paged = list_activity_logs(
            &db,
            &ActivityLogQuery {
                per_page: Some(2),
                page: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(paged.items.len(), 1);
        assert_eq!(paged.total_pages, 2);

        let far = list_activity_logs(
            &db,
            &ActivityLogQuery {
                page: Some(i64::MAX),
                per_page: Some(100),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(far.items.is_empty());
        assert_eq!(far.page, i64::MAX);
        assert_eq!(far.total, 3);

        assert_eq!(list_user_activity(&db, "u1").await.unwrap().len(), 3);
        assert_eq!(list_action_codes(&db).await.unwrap(), vec!["ADD_CROP", "APPROVE_RECORD"]);
        assert_eq!(
            count_activity_for_target(&db, target_tables::CROPS, "1").await.unwrap(),
            1
        );
    }
}
