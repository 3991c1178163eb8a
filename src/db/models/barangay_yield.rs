//! Barangay yield submissions.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::submission::SubmissionFilter;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BarangayYield {
    pub id: i64,
    pub barangay_id: i64,
    pub barangay_name: Option<String>,
    pub crop_id: i64,
    pub crop_name: Option<String>,
    pub year: i64,
    pub month: i64,
    pub season: String,
    /// Metric tons
    pub total_yield: f64,
    pub total_area_planted_ha: f64,
    pub yield_per_hectare: f64,
    pub status: String,
    pub recorded_by_user_id: Option<String>,
    pub recorded_by_name: Option<String>,
    pub rejection_reason: Option<String>,
    pub reviewed_by_user_id: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Raw request body. Numbers arrive as loosely typed JSON and are validated by the handler.
#[derive(Debug, Default, Deserialize)]
pub struct YieldInput {
    pub barangay_id: Option<i64>,
    pub crop_id: Option<i64>,
    pub year: Option<i64>,
    pub month: Option<serde_json::Value>,
    pub season: Option<String>,
    pub total_yield: Option<f64>,
    pub total_area_planted_ha: Option<f64>,
    pub yield_per_hectare: Option<f64>,
}

impl YieldInput {
    pub fn is_empty(&self) -> bool {
        self.barangay_id.is_none()
            && self.crop_id.is_none()
            && self.year.is_none()
            && self.month.is_none()
            && self.season.is_none()
            && self.total_yield.is_none()
            && self.total_area_planted_ha.is_none()
            && self.yield_per_hectare.is_none()
    }
}

/// Validated yield values, ready to persist
#[derive(Debug, Clone, PartialEq)]
pub struct YieldValues {
    pub barangay_id: i64,
    pub crop_id: i64,
    pub year: i64,
    pub month: u32,
    pub season: String,
    pub total_yield: f64,
    pub total_area_planted_ha: f64,
    pub yield_per_hectare: f64,
}

impl From<&BarangayYield> for YieldValues {
    fn from(row: &BarangayYield) -> Self {
        Self {
            barangay_id: row.barangay_id,
            crop_id: row.crop_id,
            year: row.year,
            month: row.month as u32,
            season: row.season.clone(),
            total_yield: row.total_yield,
            total_area_planted_ha: row.total_area_planted_ha,
            yield_per_hectare: row.yield_per_hectare,
        }
    }
}

const SELECT_YIELD: &str = r#"
    SELECT y.*, b.name AS barangay_name, c.name AS crop_name,
           CASE WHEN u.id IS NULL THEN NULL ELSE u.first_name || ' ' || u.last_name END AS recorded_by_name
    FROM barangay_yields y
    LEFT JOIN barangays b ON b.id = y.barangay_id
    LEFT JOIN crops c ON c.id = y.crop_id
    LEFT JOIN users u ON u.id = y.recorded_by_user_id
"#;

pub async fn insert_yield(
    db: &SqlitePool,
    values: &YieldValues,
    recorded_by: &str,
) -> Result<BarangayYield, sqlx::Error> {
    let id = sqlx::query(
        r#"
        INSERT INTO barangay_yields
            (barangay_id, crop_id, year, month, season, total_yield, total_area_planted_ha,
             yield_per_hectare, status, recorded_by_user_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(values.barangay_id)
    .bind(values.crop_id)
    .bind(values.year)
    .bind(values.month)
    .bind(&values.season)
    .bind(values.total_yield)
    .bind(values.total_area_planted_ha)
    .bind(values.yield_per_hectare)
    .bind(recorded_by)
    .execute(db)
    .await?
    .last_insert_rowid();

    let sql = format!("{} WHERE y.id = ?", SELECT_YIELD);
    sqlx::query_as(&sql).bind(id).fetch_one(db).await
}

pub async fn find_yield(db: &SqlitePool, id: i64) -> Result<Option<BarangayYield>, sqlx::Error> {
    let sql = format!("{} WHERE y.id = ?", SELECT_YIELD);
    sqlx::query_as(&sql).bind(id).fetch_optional(db).await
}

pub async fn list_yields(db: &SqlitePool, filter: &SubmissionFilter) -> Result<Vec<BarangayYield>, sqlx::Error> {
    let (where_clause, bindings) = filter.where_clause("y");
    let sql = format!(
        "{} {} ORDER BY y.year DESC, y.month DESC, y.id DESC LIMIT ? OFFSET ?",
        SELECT_YIELD, where_clause
    );
    let mut query = sqlx::query_as::<_, BarangayYield>(&sql);
    for binding in &bindings {
        query = query.bind(binding);
    }
    query.bind(filter.limit).bind(filter.offset).fetch_all(db).await
}

/// Overwrite a pending record's values. Returns false when no pending row matched.
pub async fn update_pending_yield(db: &SqlitePool, id: i64, values: &YieldValues) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE barangay_yields SET
            barangay_id = ?, crop_id = ?, year = ?, month = ?, season = ?,
            total_yield = ?, total_area_planted_ha = ?, yield_per_hectare = ?,
            updated_at = datetime('now')
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(values.barangay_id)
    .bind(values.crop_id)
    .bind(values.year)
    .bind(values.month)
    .bind(&values.season)
    .bind(values.total_yield)
    .bind(values.total_area_planted_ha)
    .bind(values.yield_per_hectare)
    .bind(id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}
