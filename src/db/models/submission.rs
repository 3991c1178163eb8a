//! Submission records shared logic: record types, review status, month/season
//! handling and the approve/reject workflow.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;

use super::audit::{actions, insert_activity_log, NewActivityLog};

/// Tables holding reviewable submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    BarangayYields,
    CropPrices,
}

impl RecordType {
    pub const ALL: [RecordType; 2] = [RecordType::BarangayYields, RecordType::CropPrices];

    /// Backing table name. Only these two literals are ever interpolated into SQL.
    pub fn table(&self) -> &'static str {
        match self {
            RecordType::BarangayYields => "barangay_yields",
            RecordType::CropPrices => "crop_prices",
        }
    }

    /// Human label used in messages and log summaries
    pub fn label(&self) -> &'static str {
        match self {
            RecordType::BarangayYields => "yield record",
            RecordType::CropPrices => "crop price record",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

impl std::str::FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
            .replace('-', "_");

        match normalized.as_str() {
            "barangay_yields" | "barangay_yield" | "yields" | "yield" => Ok(RecordType::BarangayYields),
            "crop_prices" | "crop_price" | "barangay_crop_prices" | "barangay_crop_price" => {
                Ok(RecordType::CropPrices)
            }
            _ => Err(format!(
                "Invalid record type: {}. Must be one of: {}",
                s,
                RecordType::ALL.map(|t| t.table()).join(", ")
            )),
        }
    }
}

/// Review state of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(SubmissionStatus::Pending),
            "approved" => Ok(SubmissionStatus::Approved),
            "rejected" => Ok(SubmissionStatus::Rejected),
            _ => Err(format!("Invalid status: {}. Must be one of: pending, approved, rejected", s)),
        }
    }
}

/// Decision taken by a reviewer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject { reason: String },
}

impl ReviewDecision {
    pub fn target_status(&self) -> SubmissionStatus {
        match self {
            ReviewDecision::Approve => SubmissionStatus::Approved,
            ReviewDecision::Reject { .. } => SubmissionStatus::Rejected,
        }
    }

    fn action(&self) -> &'static str {
        match self {
            ReviewDecision::Approve => actions::APPROVE_RECORD,
            ReviewDecision::Reject { .. } => actions::REJECT_RECORD,
        }
    }

    fn reason(&self) -> Option<&str> {
        match self {
            ReviewDecision::Approve => None,
            ReviewDecision::Reject { reason } => Some(reason),
        }
    }
}

pub const MONTH_RANGE_MESSAGE: &str = "Month must be an integer between 1 and 12";

const MONTH_NAMES: [&str; 12] = [
    "january", "february", "march", "april", "may", "june",
    "july", "august", "september", "october", "november", "december",
];

/// Parse a month from JSON input.
///
/// Accepts an integer, an integer string or an English month name (full or
/// three-letter). Anything else, including fractions and out-of-range
/// numbers, yields `None`.
pub fn parse_month(value: &serde_json::Value) -> Option<u32> {
    use serde_json::Value;

    let month = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else {
                let f = n.as_f64()?;
                if f.fract() != 0.0 {
                    return None;
                }
                f as i64
            }
        }
        Value::String(s) => {
            let trimmed = s.trim();
            match trimmed.parse::<i64>() {
                Ok(i) => i,
                Err(_) => {
                    let lower = trimmed.to_lowercase();
                    let position = MONTH_NAMES
                        .iter()
                        .position(|name| *name == lower || (lower.len() == 3 && name.starts_with(&lower)))?;
                    position as i64 + 1
                }
            }
        }
        _ => return None,
    };

    (1..=12).contains(&month).then_some(month as u32)
}

/// Growing season for a month: June to November is the wet season, the rest dry
pub fn month_to_season(month: u32) -> &'static str {
    match month {
        6..=11 => "wet",
        _ => "dry",
    }
}

/// Normalise a season label, accepting a few common spellings
pub fn normalize_season(value: &str) -> Option<&'static str> {
    match value.trim().to_lowercase().as_str() {
        "wet" | "wet season" | "rainy" | "rainy season" => Some("wet"),
        "dry" | "dry season" => Some("dry"),
        _ => None,
    }
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("{} {} not found", .record_type.label(), .id)]
    NotFound { record_type: RecordType, id: i64 },

    #[error("No pending approval exists for this record (current status: {current})")]
    NotPending { current: String },

    #[error("Rejection reason is required")]
    MissingReason,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Reviewer identity recorded on the row and in the activity log
#[derive(Debug, Clone)]
pub struct Reviewer<'a> {
    pub user_id: &'a str,
    pub role: &'a str,
}

/// Status snapshot of one submission
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApprovalStatus {
    pub record_type: String,
    pub record_id: i64,
    pub status: String,
    pub recorded_by_user_id: Option<String>,
    pub reviewed_by_user_id: Option<String>,
    pub reviewed_by_name: Option<String>,
    pub reviewed_at: Option<String>,
    pub rejection_reason: Option<String>,
}

/// Ownership and state of a submission, used by guards before mutating it
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubmissionMeta {
    pub id: i64,
    pub status: String,
    pub recorded_by_user_id: Option<String>,
}

impl SubmissionMeta {
    pub fn is_pending(&self) -> bool {
        self.status == SubmissionStatus::Pending.as_str()
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.recorded_by_user_id.as_deref() == Some(user_id)
    }
}

/// Filters shared by the submission list endpoints
#[derive(Debug, Clone, Default)]
pub struct SubmissionFilter {
    pub status: Option<SubmissionStatus>,
    pub recorded_by: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl SubmissionFilter {
    pub(crate) fn where_clause(&self, alias: &str) -> (String, Vec<String>) {
        let mut conditions = Vec::new();
        let mut bindings = Vec::new();

        if let Some(status) = self.status {
            conditions.push(format!("{}.status = ?", alias));
            bindings.push(status.as_str().to_string());
        }
        if let Some(user_id) = &self.recorded_by {
            conditions.push(format!("{}.recorded_by_user_id = ?", alias));
            bindings.push(user_id.clone());
        }

        if conditions.is_empty() {
            (String::new(), bindings)
        } else {
            (format!("WHERE {}", conditions.join(" AND ")), bindings)
        }
    }
}

pub async fn find_submission_meta(
    db: &SqlitePool,
    record_type: RecordType,
    id: i64,
) -> Result<Option<SubmissionMeta>, sqlx::Error> {
    let sql = format!(
        "SELECT id, status, recorded_by_user_id FROM {} WHERE id = ?",
        record_type.table()
    );
    sqlx::query_as(&sql).bind(id).fetch_optional(db).await
}

/// Delete a submission that is still pending. Returns false when no pending row matched.
pub async fn delete_pending_submission(
    db: &SqlitePool,
    record_type: RecordType,
    id: i64,
) -> Result<bool, sqlx::Error> {
    let sql = format!(
        "DELETE FROM {} WHERE id = ? AND status = 'pending'",
        record_type.table()
    );
    let result = sqlx::query(&sql).bind(id).execute(db).await?;
    Ok(result.rows_affected() > 0)
}

/// Approve or reject a pending submission.
///
/// The status change and its activity log entry commit together; any error
/// rolls both back. A record can be decided once only.
pub async fn review_submission(
    db: &SqlitePool,
    record_type: RecordType,
    id: i64,
    decision: &ReviewDecision,
    reviewer: &Reviewer<'_>,
) -> Result<ApprovalStatus, ReviewError> {
    let reason = match decision.reason() {
        Some(r) if r.trim().is_empty() => return Err(ReviewError::MissingReason),
        Some(r) => Some(r.trim().to_string()),
        None => None,
    };

    let table = record_type.table();
    let new_status = decision.target_status();
    let mut tx = db.begin().await?;

    // Guarded write first so the transaction holds the write lock before any read
    let updated = sqlx::query(&format!(
        r#"
        UPDATE {} SET
            status = ?,
            rejection_reason = ?,
            reviewed_by_user_id = ?,
            reviewed_at = datetime('now'),
            updated_at = datetime('now')
        WHERE id = ? AND status = 'pending'
        "#,
        table
    ))
    .bind(new_status.as_str())
    .bind(&reason)
    .bind(reviewer.user_id)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        let current: Option<(String,)> =
            sqlx::query_as(&format!("SELECT status FROM {} WHERE id = ?", table))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        return Err(match current {
            Some((current,)) => ReviewError::NotPending { current },
            None => ReviewError::NotFound { record_type, id },
        });
    }

    let details = serde_json::json!({
        "summary": format!("{} #{} {}", record_type.label(), id, new_status),
        "record_type": table,
        "previous_status": SubmissionStatus::Pending.as_str(),
        "new_status": new_status.as_str(),
        "reason": reason,
    });

    insert_activity_log(
        &mut *tx,
        &NewActivityLog {
            user_id: Some(reviewer.user_id),
            role: Some(reviewer.role),
            action: decision.action(),
            target_table: Some(table),
            target_id: Some(id.to_string()),
            details: Some(details),
        },
    )
    .await?;

    let status = approval_status_in(&mut *tx, record_type, id)
        .await?
        .ok_or(ReviewError::NotFound { record_type, id })?;

    tx.commit().await?;

    tracing::info!(
        record_type = table,
        record_id = id,
        status = new_status.as_str(),
        reviewer = reviewer.user_id,
        "Submission reviewed"
    );

    Ok(status)
}

async fn approval_status_in<'e, E>(
    executor: E,
    record_type: RecordType,
    id: i64,
) -> Result<Option<ApprovalStatus>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let sql = format!(
        r#"
        SELECT ? AS record_type, r.id AS record_id, r.status, r.recorded_by_user_id,
               r.reviewed_by_user_id,
               CASE WHEN u.id IS NULL THEN NULL ELSE u.first_name || ' ' || u.last_name END AS reviewed_by_name,
               r.reviewed_at, r.rejection_reason
        FROM {} r
        LEFT JOIN users u ON u.id = r.reviewed_by_user_id
        WHERE r.id = ?
        "#,
        record_type.table()
    );
    sqlx::query_as(&sql)
        .bind(record_type.table())
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn approval_status(
    db: &SqlitePool,
    record_type: RecordType,
    id: i64,
) -> Result<Option<ApprovalStatus>, sqlx::Error> {
    approval_status_in(db, record_type, id).await
}

/// Filters for the reviewer queue
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewQueueQuery {
    #[serde(alias = "recordType")]
    pub record_type: Option<String>,
    /// `pending` by default; `all` disables the filter
    pub status: Option<String>,
    /// Matches the record id or the submitter's name
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReviewQueueItem {
    pub record_type: String,
    pub record_id: i64,
    pub barangay_id: i64,
    pub barangay_name: Option<String>,
    pub crop_id: i64,
    pub crop_name: Option<String>,
    pub year: i64,
    pub month: i64,
    pub season: String,
    /// Yield in metric tons or price per kg, depending on the record type
    pub value: f64,
    pub status: String,
    pub recorded_by_user_id: Option<String>,
    pub recorded_by_name: Option<String>,
    pub rejection_reason: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewQueue {
    pub items: Vec<ReviewQueueItem>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Resolved review queue filters
#[derive(Debug, Clone)]
pub struct ReviewQueueFilter {
    pub record_types: Vec<RecordType>,
    pub status: Option<SubmissionStatus>,
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl ReviewQueueQuery {
    pub fn resolve(&self) -> Result<ReviewQueueFilter, String> {
        let record_types = match self.record_type.as_deref().map(str::trim) {
            None | Some("") | Some("all") => RecordType::ALL.to_vec(),
            Some(raw) => vec![raw.parse()?],
        };

        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => Some(SubmissionStatus::Pending),
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => Some(s.parse()?),
        };

        Ok(ReviewQueueFilter {
            record_types,
            status,
            search: self
                .q
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_string),
            limit: self.limit.unwrap_or(50).clamp(1, 200),
            offset: self.offset.unwrap_or(0).max(0),
        })
    }
}

fn queue_select(record_type: RecordType) -> String {
    let value_column = match record_type {
        RecordType::BarangayYields => "r.total_yield",
        RecordType::CropPrices => "r.price_per_kg",
    };
    format!(
        r#"
        SELECT '{table}' AS record_type, r.id AS record_id, r.barangay_id, b.name AS barangay_name,
               r.crop_id, c.name AS crop_name, r.year, r.month, r.season, {value_column} AS value,
               r.status, r.recorded_by_user_id,
               CASE WHEN u.id IS NULL THEN NULL ELSE u.first_name || ' ' || u.last_name END AS recorded_by_name,
               r.rejection_reason, r.reviewed_at, r.created_at
        FROM {table} r
        LEFT JOIN barangays b ON b.id = r.barangay_id
        LEFT JOIN crops c ON c.id = r.crop_id
        LEFT JOIN users u ON u.id = r.recorded_by_user_id
        "#,
        table = record_type.table(),
        value_column = value_column,
    )
}

/// Submissions across both tables for the review screen, newest first
pub async fn list_review_queue(db: &SqlitePool, filter: &ReviewQueueFilter) -> Result<ReviewQueue, sqlx::Error> {
    let mut conditions = Vec::new();
    let mut per_branch_bindings: Vec<String> = Vec::new();

    if let Some(status) = filter.status {
        conditions.push("r.status = ?");
        per_branch_bindings.push(status.as_str().to_string());
    }
    if let Some(search) = &filter.search {
        conditions.push(
            "(CAST(r.id AS TEXT) = ? OR (u.first_name || ' ' || u.last_name) LIKE ? OR u.email LIKE ?)",
        );
        per_branch_bindings.push(search.clone());
        per_branch_bindings.push(format!("%{}%", search));
        per_branch_bindings.push(format!("%{}%", search));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let union = filter
        .record_types
        .iter()
        .map(|t| format!("{} {}", queue_select(*t), where_clause))
        .collect::<Vec<_>>()
        .join(" UNION ALL ");

    let bindings: Vec<&String> = filter
        .record_types
        .iter()
        .flat_map(|_| per_branch_bindings.iter())
        .collect();

    let count_sql = format!("SELECT COUNT(*) FROM ({})", union);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for binding in &bindings {
        count_query = count_query.bind(*binding);
    }
    let total = count_query.fetch_one(db).await?;

    let sql = format!(
        "SELECT * FROM ({}) ORDER BY created_at DESC, record_id DESC LIMIT ? OFFSET ?",
        union
    );
    let mut list_query = sqlx::query_as::<_, ReviewQueueItem>(&sql);
    for binding in &bindings {
        list_query = list_query.bind(*binding);
    }
    let items = list_query
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(db)
        .await?;

    Ok(ReviewQueue {
        items,
        total,
        limit: filter.limit,
        offset: filter.offset,
    })
}

/// Reference columns other tables point at from submissions
#[derive(Debug, Clone, Copy)]
pub enum ReferenceColumn {
    Crop,
    Barangay,
}

impl ReferenceColumn {
    fn column(&self) -> &'static str {
        match self {
            ReferenceColumn::Crop => "crop_id",
            ReferenceColumn::Barangay => "barangay_id",
        }
    }
}

/// Number of submissions, across both tables, that reference a crop or barangay
pub async fn count_submissions_referencing(
    db: &SqlitePool,
    reference: ReferenceColumn,
    id: i64,
) -> Result<i64, sqlx::Error> {
    let column = reference.column();
    let sql = RecordType::ALL
        .iter()
        .map(|t| format!("SELECT COUNT(*) AS n FROM {} WHERE {} = ?", t.table(), column))
        .collect::<Vec<_>>()
        .join(" UNION ALL ");
    let sql = format!("SELECT COALESCE(SUM(n), 0) FROM ({})", sql);

    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    for _ in RecordType::ALL {
        query = query.bind(id);
    }
    query.fetch_one(db).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_type_aliases() {
        for alias in [
            "barangay_yields",
            "barangay-yields",
            "barangay_yield",
            "Barangay Yields",
        ] {
            assert_eq!(alias.parse::<RecordType>().unwrap(), RecordType::BarangayYields, "{alias}");
        }
        for alias in [
            "crop_prices",
            "crop-prices",
            "crop_price",
            "barangay_crop_prices",
            "barangay-crop-prices",
        ] {
            assert_eq!(alias.parse::<RecordType>().unwrap(), RecordType::CropPrices, "{alias}");
        }
    }

    #[test]
    fn test_record_type_error_lists_valid_types() {
        let err = "users".parse::<RecordType>().unwrap_err();
        assert_eq!(
            err,
            "Invalid record type: users. Must be one of: barangay_yields, crop_prices"
        );
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month(&json!(1)), Some(1));
        assert_eq!(parse_month(&json!(12)), Some(12));
        assert_eq!(parse_month(&json!("7")), Some(7));
        assert_eq!(parse_month(&json!(" March ")), Some(3));
        assert_eq!(parse_month(&json!("sep")), Some(9));
        assert_eq!(parse_month(&json!(6.0)), Some(6));

        assert_eq!(parse_month(&json!(0)), None);
        assert_eq!(parse_month(&json!(13)), None);
        assert_eq!(parse_month(&json!(4.5)), None);
        assert_eq!(parse_month(&json!("13")), None);
        assert_eq!(parse_month(&json!("smarch")), None);
        assert_eq!(parse_month(&json!(null)), None);
        assert_eq!(parse_month(&json!(true)), None);
    }

    #[test]
    fn test_month_to_season() {
        assert_eq!(month_to_season(6), "wet");
        assert_eq!(month_to_season(11), "wet");
        assert_eq!(month_to_season(12), "dry");
        assert_eq!(month_to_season(1), "dry");
        assert_eq!(month_to_season(5), "dry");
        assert_eq!(normalize_season("Rainy Season"), Some("wet"));
        assert_eq!(normalize_season("DRY"), Some("dry"));
        assert_eq!(normalize_season("monsoon"), None);
    }

    #[test]
    fn test_review_queue_query_defaults() {
        let filter = ReviewQueueQuery::default().resolve().unwrap();
        assert_eq!(filter.status, Some(SubmissionStatus::Pending));
        assert_eq!(filter.record_types.len(), 2);
        assert_eq!(filter.limit, 50);

        let all = ReviewQueueQuery {
            status: Some("ALL".into()),
            record_type: Some("crop-prices".into()),
            limit: Some(1000),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert_eq!(all.status, None);
        assert_eq!(all.record_types, vec![RecordType::CropPrices]);
        assert_eq!(all.limit, 200);

        assert!(ReviewQueueQuery {
            status: Some("archived".into()),
            ..Default::default()
        }
        .resolve()
        .is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reviews_on_file_database() {
        use crate::db::{insert_barangay, insert_crop, insert_user, insert_yield, NewUser, Role, YieldValues};

        let dir = tempfile::tempdir().unwrap();
        let db = crate::db::init(dir.path()).await.unwrap();
        let barangay = insert_barangay(&db, "San Pablo", None, None, None).await.unwrap();
        let crop = insert_crop(&db, "Rice", None).await.unwrap();
        let admin = insert_user(
            &db,
            &NewUser {
                first_name: "Ada",
                last_name: "Admin",
                email: "ada@example.com",
                password_hash: "x",
                role: Role::Admin,
                is_verified: true,
                contact_number: None,
            },
        )
        .await
        .unwrap();

        let mut ids = Vec::new();
        for month in 1..=12u32 {
            let values = YieldValues {
                barangay_id: barangay.id,
                crop_id: crop.id,
                year: 2024,
                month,
                season: month_to_season(month).to_string(),
                total_yield: 100.0,
                total_area_planted_ha: 25.0,
                yield_per_hectare: 4.0,
            };
            ids.push(insert_yield(&db, &values, &admin.id).await.unwrap().id);
        }

        let mut handles = Vec::new();
        for &id in &ids {
            for _ in 0..4 {
                let db = db.clone();
                let admin_id = admin.id.clone();
                handles.push(tokio::spawn(async move {
                    let reviewer = Reviewer {
                        user_id: &admin_id,
                        role: Role::Admin.as_str(),
                    };
                    let outcome =
                        review_submission(&db, RecordType::BarangayYields, id, &ReviewDecision::Approve, &reviewer)
                            .await;
                    (id, outcome)
                }));
            }
        }

        let mut approved = std::collections::HashMap::new();
        for handle in handles {
            let (id, outcome) = handle.await.unwrap();
            match outcome {
                Ok(status) => {
                    assert_eq!(status.status, "approved");
                    *approved.entry(id).or_insert(0) += 1;
                }
                Err(ReviewError::NotPending { current }) => assert_eq!(current, "approved"),
                Err(other) => panic!("review of #{} failed: {}", id, other),
            }
        }

        for id in ids {
            assert_eq!(approved.get(&id), Some(&1), "record #{}", id);
            let logs = crate::db::count_activity_for_target(&db, "barangay_yields", &id.to_string())
                .await
                .unwrap();
            assert_eq!(logs, 1);
        }
    }
}
