//! Uploaded database backup metadata.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Backup metadata row. The file itself lives at `storage_path`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Backup {
    pub id: String,
    pub filename: String,
    pub original_name: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    #[serde(skip_serializing)]
    pub storage_path: String,
    pub uploaded_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
}

/// Backup joined with uploader details, as listed by the API
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BackupWithUploader {
    pub id: String,
    pub filename: String,
    pub original_name: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub uploaded_by: Option<String>,
    pub uploaded_by_name: Option<String>,
    pub uploaded_by_email: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupResponse {
    #[serde(flatten)]
    pub backup: BackupWithUploader,
    pub download_url: String,
}

impl From<BackupWithUploader> for BackupResponse {
    fn from(backup: BackupWithUploader) -> Self {
        let download_url = format!("/api/backups/{}/download", backup.id);
        Self { backup, download_url }
    }
}

#[derive(Debug, Clone)]
pub struct NewBackup<'a> {
    pub id: &'a str,
    pub filename: &'a str,
    pub original_name: &'a str,
    pub file_size: i64,
    pub mime_type: Option<&'a str>,
    pub storage_path: &'a str,
    pub uploaded_by: &'a str,
    pub notes: Option<&'a str>,
}

const SELECT_WITH_UPLOADER: &str = r#"
    SELECT b.id, b.filename, b.original_name, b.file_size, b.mime_type, b.uploaded_by,
           CASE WHEN u.id IS NULL THEN NULL ELSE u.first_name || ' ' || u.last_name END AS uploaded_by_name,
           u.email AS uploaded_by_email, b.notes, b.created_at
    FROM backups b
    LEFT JOIN users u ON u.id = b.uploaded_by
"#;

pub async fn insert_backup(db: &SqlitePool, backup: &NewBackup<'_>) -> Result<BackupWithUploader, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO backups (id, filename, original_name, file_size, mime_type, storage_path, uploaded_by, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(backup.id)
    .bind(backup.filename)
    .bind(backup.original_name)
    .bind(backup.file_size)
    .bind(backup.mime_type)
    .bind(backup.storage_path)
    .bind(backup.uploaded_by)
    .bind(backup.notes)
    .execute(db)
    .await?;

    let sql = format!("{} WHERE b.id = ?", SELECT_WITH_UPLOADER);
    sqlx::query_as(&sql).bind(backup.id).fetch_one(db).await
}

pub async fn list_backups(db: &SqlitePool) -> Result<Vec<BackupWithUploader>, sqlx::Error> {
    let sql = format!("{} ORDER BY b.created_at DESC, b.rowid DESC", SELECT_WITH_UPLOADER);
    sqlx::query_as(&sql).fetch_all(db).await
}

pub async fn find_backup(db: &SqlitePool, id: &str) -> Result<Option<Backup>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM backups WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn delete_backup_row(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM backups WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}
