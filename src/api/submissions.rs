//! Pieces shared by the yield and crop price controllers: list filters,
//! month/season resolution, reference checks and the owner/pending guard.

use serde::Deserialize;

use crate::db::{
    find_barangay, find_crop, find_submission_meta, month_to_season, normalize_season, parse_month,
    DbPool, RecordType, SubmissionFilter, SubmissionMeta, SubmissionStatus, MONTH_RANGE_MESSAGE,
};

use super::auth::CurrentUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::is_truthy_flag;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

/// Query string for submission lists
#[derive(Debug, Default, Deserialize)]
pub struct SubmissionListQuery {
    pub status: Option<String>,
    /// Only the caller's own submissions
    pub mine: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl SubmissionListQuery {
    pub fn to_filter(&self, current: &CurrentUser) -> Result<SubmissionFilter, ApiError> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(s) => Some(s.parse::<SubmissionStatus>().map_err(ApiError::bad_request)?),
        };

        Ok(SubmissionFilter {
            status,
            recorded_by: is_truthy_flag(self.mine.as_deref()).then(|| current.id().to_string()),
            limit: self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: self.offset.unwrap_or(0).max(0),
        })
    }

    /// Filter for the public feed: approved rows only, no ownership
    pub fn to_public_filter(&self) -> SubmissionFilter {
        SubmissionFilter {
            status: Some(SubmissionStatus::Approved),
            recorded_by: None,
            limit: self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: self.offset.unwrap_or(0).max(0),
        }
    }
}

/// Resolve month and season from request input.
///
/// `base` carries the stored values on update. A season left out of the
/// request follows the month whenever the month is given.
pub fn resolve_period(
    errors: &mut ValidationErrorBuilder,
    month: Option<&serde_json::Value>,
    season: Option<&str>,
    base: Option<(u32, &str)>,
) -> (u32, String) {
    let month = match (month, base) {
        (Some(raw), _) => match parse_month(raw) {
            Some(m) => Some(m),
            None => {
                errors.add("month", MONTH_RANGE_MESSAGE);
                None
            }
        },
        (None, Some((m, _))) => Some(m),
        (None, None) => {
            errors.add("month", MONTH_RANGE_MESSAGE);
            None
        }
    };

    let season = match season.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => match normalize_season(raw) {
            Some(s) => s.to_string(),
            None => {
                errors.add("season", "Season must be either wet or dry");
                String::new()
            }
        },
        None => match (month, base) {
            (Some(m), Some((base_month, base_season))) if m == base_month => base_season.to_string(),
            (Some(m), _) => month_to_season(m).to_string(),
            (None, _) => String::new(),
        },
    };

    (month.unwrap_or(0), season)
}

/// Referenced barangay and crop must exist
pub async fn ensure_references(db: &DbPool, barangay_id: i64, crop_id: i64) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if find_barangay(db, barangay_id).await?.is_none() {
        errors.add("barangay_id", format!("Barangay {} does not exist", barangay_id));
    }
    if find_crop(db, crop_id).await?.is_none() {
        errors.add("crop_id", format!("Crop {} does not exist", crop_id));
    }
    errors.finish()
}

/// Load a submission the caller is about to change.
///
/// Owners and reviewers may touch a record, and only while it is pending.
pub async fn guard_mutation(
    db: &DbPool,
    record_type: RecordType,
    id: i64,
    current: &CurrentUser,
) -> Result<SubmissionMeta, ApiError> {
    let meta = find_submission_meta(db, record_type, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} {} not found", record_type.label(), id)))?;

    if !meta.is_owned_by(current.id()) && !current.is_reviewer() {
        return Err(ApiError::forbidden("forbidden: you can only modify your own submissions"));
    }

    if !meta.is_pending() {
        return Err(ApiError::conflict(format!(
            "Only pending records can be modified (current status: {})",
            meta.status
        )));
    }

    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_period_derives_season() {
        let mut errors = ValidationErrorBuilder::new();
        let (month, season) = resolve_period(&mut errors, Some(&json!("July")), None, None);
        assert!(errors.is_empty());
        assert_eq!((month, season.as_str()), (7, "wet"));

        let (month, season) = resolve_period(&mut errors, Some(&json!(1)), Some("Wet Season"), None);
        assert_eq!((month, season.as_str()), (1, "wet"));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_resolve_period_keeps_stored_values_on_update() {
        let mut errors = ValidationErrorBuilder::new();
        let (month, season) = resolve_period(&mut errors, None, None, Some((3, "wet")));
        assert_eq!((month, season.as_str()), (3, "wet"));

        let (month, season) = resolve_period(&mut errors, Some(&json!(12)), None, Some((3, "wet")));
        assert_eq!((month, season.as_str()), (12, "dry"));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_resolve_period_rejects_bad_input() {
        let mut errors = ValidationErrorBuilder::new();
        resolve_period(&mut errors, Some(&json!(13)), None, None);
        let err = errors.build().unwrap();
        assert_eq!(err.message(), MONTH_RANGE_MESSAGE);

        let mut errors = ValidationErrorBuilder::new();
        resolve_period(&mut errors, None, Some("monsoon"), None);
        assert!(!errors.is_empty());
    }
}
