//! Crop reference data.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Crop {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CropOption {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCropRequest {
    #[serde(alias = "crop_name")]
    pub name: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCropRequest {
    #[serde(alias = "crop_name")]
    pub name: Option<String>,
    pub category: Option<String>,
}

pub async fn list_crops(db: &SqlitePool) -> Result<Vec<Crop>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM crops ORDER BY name ASC")
        .fetch_all(db)
        .await
}

pub async fn crop_options(db: &SqlitePool) -> Result<Vec<CropOption>, sqlx::Error> {
    sqlx::query_as("SELECT id, name FROM crops ORDER BY name ASC")
        .fetch_all(db)
        .await
}

pub async fn find_crop(db: &SqlitePool, id: i64) -> Result<Option<Crop>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM crops WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn insert_crop(db: &SqlitePool, name: &str, category: Option<&str>) -> Result<Crop, sqlx::Error> {
    let id = sqlx::query("INSERT INTO crops (name, category) VALUES (?, ?)")
        .bind(name)
        .bind(category)
        .execute(db)
        .await?
        .last_insert_rowid();

    sqlx::query_as("SELECT * FROM crops WHERE id = ?")
        .bind(id)
        .fetch_one(db)
        .await
}

pub async fn update_crop(
    db: &SqlitePool,
    id: i64,
    name: Option<&str>,
    category: Option<&str>,
) -> Result<Option<Crop>, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE crops SET
            name = COALESCE(?, name),
            category = COALESCE(?, category),
            updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(name)
    .bind(category)
    .bind(id)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    find_crop(db, id).await
}

/// Delete a crop. Returns the deleted row, or `None` when it did not exist.
pub async fn delete_crop(db: &SqlitePool, id: i64) -> Result<Option<Crop>, sqlx::Error> {
    let Some(crop) = find_crop(db, id).await? else {
        return Ok(None);
    };
    sqlx::query("DELETE FROM crops WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(Some(crop))
}
