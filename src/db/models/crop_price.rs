//! Barangay crop price submissions.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::submission::SubmissionFilter;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CropPrice {
    pub id: i64,
    pub barangay_id: i64,
    pub barangay_name: Option<String>,
    pub crop_id: i64,
    pub crop_name: Option<String>,
    pub year: i64,
    pub month: i64,
    pub season: String,
    pub price_per_kg: f64,
    pub status: String,
    pub recorded_by_user_id: Option<String>,
    pub recorded_by_name: Option<String>,
    pub rejection_reason: Option<String>,
    pub reviewed_by_user_id: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CropPriceInput {
    pub barangay_id: Option<i64>,
    pub crop_id: Option<i64>,
    pub year: Option<i64>,
    pub month: Option<serde_json::Value>,
    pub season: Option<String>,
    pub price_per_kg: Option<f64>,
}

impl CropPriceInput {
    pub fn is_empty(&self) -> bool {
        self.barangay_id.is_none()
            && self.crop_id.is_none()
            && self.year.is_none()
            && self.month.is_none()
            && self.season.is_none()
            && self.price_per_kg.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CropPriceValues {
    pub barangay_id: i64,
    pub crop_id: i64,
    pub year: i64,
    pub month: u32,
    pub season: String,
    pub price_per_kg: f64,
}

impl From<&CropPrice> for CropPriceValues {
    fn from(row: &CropPrice) -> Self {
        Self {
            barangay_id: row.barangay_id,
            crop_id: row.crop_id,
            year: row.year,
            month: row.month as u32,
            season: row.season.clone(),
            price_per_kg: row.price_per_kg,
        }
    }
}

const SELECT_PRICE: &str = r#"
    SELECT p.*, b.name AS barangay_name, c.name AS crop_name,
           CASE WHEN u.id IS NULL THEN NULL ELSE u.first_name || ' ' || u.last_name END AS recorded_by_name
    FROM crop_prices p
    LEFT JOIN barangays b ON b.id = p.barangay_id
    LEFT JOIN crops c ON c.id = p.crop_id
    LEFT JOIN users u ON u.id = p.recorded_by_user_id
"#;

pub async fn insert_crop_price(
    db: &SqlitePool,
    values: &CropPriceValues,
    recorded_by: &str,
) -> Result<CropPrice, sqlx::Error> {
    let id = sqlx::query(
        r#"
        INSERT INTO crop_prices
            (barangay_id, crop_id, year, month, season, price_per_kg, status, recorded_by_user_id)
        VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(values.barangay_id)
    .bind(values.crop_id)
    .bind(values.year)
    .bind(values.month)
    .bind(&values.season)
    .bind(values.price_per_kg)
    .bind(recorded_by)
    .execute(db)
    .await?
    .last_insert_rowid();

    let sql = format!("{} WHERE p.id = ?", SELECT_PRICE);
    sqlx::query_as(&sql).bind(id).fetch_one(db).await
}

pub async fn find_crop_price(db: &SqlitePool, id: i64) -> Result<Option<CropPrice>, sqlx::Error> {
    let sql = format!("{} WHERE p.id = ?", SELECT_PRICE);
    sqlx::query_as(&sql).bind(id).fetch_optional(db).await
}

pub async fn list_crop_prices(db: &SqlitePool, filter: &SubmissionFilter) -> Result<Vec<CropPrice>, sqlx::Error> {
    let (where_clause, bindings) = filter.where_clause("p");
    let sql = format!(
        "{} {} ORDER BY p.year DESC, p.month DESC, p.id DESC LIMIT ? OFFSET ?",
        SELECT_PRICE, where_clause
    );
    let mut query = sqlx::query_as::<_, CropPrice>(&sql);
    for binding in &bindings {
        query = query.bind(binding);
    }
    query.bind(filter.limit).bind(filter.offset).fetch_all(db).await
}

pub async fn update_pending_crop_price(
    db: &SqlitePool,
    id: i64,
    values: &CropPriceValues,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE crop_prices SET
            barangay_id = ?, crop_id = ?, year = ?, month = ?, season = ?, price_per_kg = ?,
            updated_at = datetime('now')
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(values.barangay_id)
    .bind(values.crop_id)
    .bind(values.year)
    .bind(values.month)
    .bind(&values.season)
    .bind(values.price_per_kg)
    .bind(id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}
