//! Database backup file endpoints (super-admin only).
//!
//! Backups are opaque `.sql` dumps: uploaded, listed, downloaded and deleted.
//! The service never restores them.

use axum::{
    body::Body,
    extract::{Multipart, State},
    http::header,
    response::Response,
};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::db::{
    actions, delete_backup_row, find_backup, insert_backup, list_backups, target_tables, BackupResponse,
    NewBackup, Role,
};
use crate::utils::slugify_file_stem;
use crate::AppState;

use super::audit::audit_log;
use super::auth::CurrentUser;
use super::error::ApiError;
use super::extract::ApiPath;
use super::response::ApiResponse;
use super::validation::normalize_notes;

pub const FILE_FIELD: &str = "backupFile";
const MISSING_FILE_MESSAGE: &str = "Please attach a backup file to upload.";

#[derive(Debug, Serialize)]
pub struct BackupList {
    pub results: Vec<BackupResponse>,
}

/// File written to disk while the multipart body is read
struct StoredUpload {
    filename: String,
    original_name: String,
    path: std::path::PathBuf,
    size: u64,
    mime_type: Option<String>,
}

fn stored_filename(original_name: &str) -> String {
    let random: u32 = rand::rng().random();
    format!(
        "{}-{:08x}-{}.sql",
        chrono::Utc::now().format("%Y%m%d%H%M%S"),
        random,
        slugify_file_stem(original_name)
    )
}

/// Download header: an ASCII `filename` fallback plus the exact name as an
/// RFC 5987 `filename*` parameter
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c.is_ascii() && c != '"' && c != '\\' { c } else { '_' })
        .collect();

    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }

    format!("attachment; filename=\"{}\"; filename*=UTF-8''{}", fallback, encoded)
}

fn is_sql_file(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("sql"))
}

async fn discard(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial backup upload");
    }
}

/// Stream one multipart field to disk, enforcing the size limit
async fn store_field(
    state: &AppState,
    mut field: axum::extract::multipart::Field<'_>,
) -> Result<StoredUpload, ApiError> {
    let original_name = field
        .file_name()
        .map(str::to_string)
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(MISSING_FILE_MESSAGE))?;
    if !is_sql_file(&original_name) {
        return Err(ApiError::bad_request("Only .sql backup files are allowed."));
    }
    let mime_type = field.content_type().map(str::to_string);

    let dir = &state.config.backups.directory;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create backup directory: {}", e)))?;

    let filename = stored_filename(&original_name);
    let path = dir.join(&filename);
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create backup file: {}", e)))?;

    let limit = state.config.backups.max_size_bytes();
    let mut size: u64 = 0;
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                discard(&path).await;
                return Err(ApiError::bad_request(format!("Failed to read upload: {}", e)));
            }
        };
        size += chunk.len() as u64;
        if size > limit {
            drop(file);
            discard(&path).await;
            return Err(ApiError::payload_too_large(format!(
                "Backup file exceeds the {} MB limit.",
                state.config.backups.max_size_mb
            )));
        }
        if let Err(e) = file.write_all(&chunk).await {
            discard(&path).await;
            return Err(ApiError::internal(format!("Failed to write backup file: {}", e)));
        }
    }

    if let Err(e) = file.flush().await {
        discard(&path).await;
        return Err(ApiError::internal(format!("Failed to write backup file: {}", e)));
    }

    if size == 0 {
        discard(&path).await;
        return Err(ApiError::bad_request("The uploaded backup file is empty."));
    }

    Ok(StoredUpload {
        filename,
        original_name,
        path,
        size,
        mime_type,
    })
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<ApiResponse<BackupList>, ApiError> {
    current.require_role(&[Role::SuperAdmin])?;
    let results = list_backups(&state.db)
        .await?
        .into_iter()
        .map(BackupResponse::from)
        .collect();
    Ok(ApiResponse::ok("backups fetched successfully", BackupList { results }))
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    mut multipart: Multipart,
) -> Result<ApiResponse<BackupResponse>, ApiError> {
    current.require_role(&[Role::SuperAdmin])?;

    let mut upload: Option<StoredUpload> = None;
    let mut notes: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                if let Some(stored) = &upload {
                    discard(&stored.path).await;
                }
                return Err(ApiError::bad_request(format!("Invalid multipart body: {}", e)));
            }
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FILE_FIELD) if upload.is_none() => upload = Some(store_field(&state, field).await?),
            Some("notes") => {
                let text = field.text().await.unwrap_or_default();
                notes = normalize_notes(Some(&text));
            }
            _ => {}
        }
    }

    let stored = upload.ok_or_else(|| ApiError::bad_request(MISSING_FILE_MESSAGE))?;
    let id = uuid::Uuid::new_v4().to_string();
    let storage_path = stored.path.to_string_lossy().to_string();

    let backup = match insert_backup(
        &state.db,
        &NewBackup {
            id: &id,
            filename: &stored.filename,
            original_name: &stored.original_name,
            file_size: stored.size as i64,
            mime_type: stored.mime_type.as_deref(),
            storage_path: &storage_path,
            uploaded_by: current.id(),
            notes: notes.as_deref(),
        },
    )
    .await
    {
        Ok(backup) => backup,
        Err(e) => {
            discard(&stored.path).await;
            return Err(e.into());
        }
    };

    tracing::info!(backup_id = %id, size = stored.size, user_id = %current.id(), "Backup uploaded");
    audit_log(
        &state,
        current.activity(
            actions::BACKUP_UPLOADED,
            target_tables::BACKUPS,
            &id,
            serde_json::json!({
                "original_name": stored.original_name,
                "file_size": stored.size,
                "notes": notes,
            }),
        ),
    )
    .await;

    Ok(ApiResponse::created("backup uploaded successfully", BackupResponse::from(backup)))
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> Result<Response, ApiError> {
    current.require_role(&[Role::SuperAdmin])?;

    let backup = find_backup(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("backup not found"))?;

    let file = tokio::fs::File::open(&backup.storage_path).await.map_err(|e| {
        tracing::warn!(error = %e, path = %backup.storage_path, "Backup file missing on disk");
        ApiError::not_found("backup file not found on disk")
    })?;
    let metadata = file
        .metadata()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read backup file metadata: {}", e)))?;

    audit_log(
        &state,
        current.activity(
            actions::BACKUP_DOWNLOADED,
            target_tables::BACKUPS,
            &backup.id,
            serde_json::json!({ "original_name": backup.original_name }),
        ),
    )
    .await;

    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, content_disposition(&backup.original_name))
        .header(header::CONTENT_LENGTH, metadata.len())
        .body(body)
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> Result<ApiResponse<()>, ApiError> {
    current.require_role(&[Role::SuperAdmin])?;

    let backup = find_backup(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("backup not found"))?;

    if !delete_backup_row(&state.db, &backup.id).await? {
        return Err(ApiError::not_found("backup not found"));
    }

    if let Err(e) = tokio::fs::remove_file(&backup.storage_path).await {
        tracing::warn!(
            backup_id = %backup.id,
            path = %backup.storage_path,
            error = %e,
            "Failed to delete backup file"
        );
    }

    audit_log(
        &state,
        current.activity(
            actions::BACKUP_DELETED,
            target_tables::BACKUPS,
            &backup.id,
            serde_json::json!({ "original_name": backup.original_name, "file_size": backup.file_size }),
        ),
    )
    .await;

    Ok(ApiResponse::message("backup deleted successfully"))
}
