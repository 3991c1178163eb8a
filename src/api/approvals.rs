//! Review endpoints: approve or reject pending submissions and inspect the queue.

use axum::extract::State;
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{
    approval_status, list_review_queue, review_submission, ApprovalStatus, RecordType, ReviewDecision,
    ReviewQueue, ReviewQueueQuery, Reviewer, Role,
};
use crate::AppState;

use super::auth::CurrentUser;
use super::error::ApiError;
use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::response::ApiResponse;

#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequest {
    pub reason: Option<String>,
}

fn parse_target(record_type: &str, record_id: &str) -> Result<(RecordType, i64), ApiError> {
    let record_type = record_type.parse::<RecordType>().map_err(ApiError::bad_request)?;
    let record_id = record_id
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid record id: {}", record_id)))?;
    Ok((record_type, record_id))
}

async fn decide(
    state: &AppState,
    current: &CurrentUser,
    record_type: RecordType,
    record_id: i64,
    decision: ReviewDecision,
) -> Result<ApprovalStatus, ApiError> {
    let reviewer = Reviewer {
        user_id: current.id(),
        role: current.role.as_str(),
    };
    Ok(review_submission(&state.db, record_type, record_id, &decision, &reviewer).await?)
}

pub async fn approve(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath((record_type, record_id)): ApiPath<(String, String)>,
) -> Result<ApiResponse<ApprovalStatus>, ApiError> {
    current.require_role(Role::REVIEWERS)?;
    let (record_type, record_id) = parse_target(&record_type, &record_id)?;

    let status = decide(&state, &current, record_type, record_id, ReviewDecision::Approve).await?;
    Ok(ApiResponse::ok(format!("{} approved successfully", record_type.label()), status))
}

pub async fn reject(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath((record_type, record_id)): ApiPath<(String, String)>,
    body: Option<ApiJson<ReviewRequest>>,
) -> Result<ApiResponse<ApprovalStatus>, ApiError> {
    current.require_role(Role::REVIEWERS)?;
    let (record_type, record_id) = parse_target(&record_type, &record_id)?;

    let reason = body.and_then(|ApiJson(b)| b.reason).unwrap_or_default();
    let status = decide(
        &state,
        &current,
        record_type,
        record_id,
        ReviewDecision::Reject { reason },
    )
    .await?;
    Ok(ApiResponse::ok(format!("{} rejected successfully", record_type.label()), status))
}

/// Review state of one record. Open to every signed-in user so submitters can follow up.
pub async fn status(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
    ApiPath((record_type, record_id)): ApiPath<(String, String)>,
) -> Result<ApiResponse<ApprovalStatus>, ApiError> {
    let (record_type, record_id) = parse_target(&record_type, &record_id)?;
    let status = approval_status(&state.db, record_type, record_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} {} not found", record_type.label(), record_id)))?;
    Ok(ApiResponse::ok("approval status fetched successfully", status))
}

pub async fn pending(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiQuery(query): ApiQuery<ReviewQueueQuery>,
) -> Result<ApiResponse<ReviewQueue>, ApiError> {
    current.require_role(Role::REVIEWERS)?;
    let filter = query.resolve().map_err(ApiError::bad_request)?;
    let queue = list_review_queue(&state.db, &filter).await?;
    Ok(ApiResponse::ok("review queue fetched successfully", queue))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{request, send, TestApp};
    use crate::db::{actions, count_activity_for_target, target_tables};
    use axum::http::StatusCode;
    use serde_json::json;

    struct Fixture {
        app: TestApp,
        admin: String,
        tech: String,
        yield_id: i64,
    }

    async fn fixture() -> Fixture {
        let app = TestApp::new().await;
        let (barangay_id, crop_id) = app.seed_reference().await;
        let (_, tech) = app.create_user("tech@example.com", Role::Technician, true).await;
        let (_, admin) = app.create_user("admin@example.com", Role::Admin, true).await;

        let created = send(
            &app,
            request(
                "POST",
                "/api/barangay-yields",
                Some(&tech),
                Some(json!({
                    "barangay_id": barangay_id, "crop_id": crop_id, "year": 2024, "month": 9,
                    "total_yield": 50.0, "total_area_planted_ha": 10.0
                })),
            ),
        )
        .await;
        let yield_id = created.body["data"]["id"].as_i64().unwrap();
        Fixture {
            app,
            admin,
            tech,
            yield_id,
        }
    }

    async fn status_of(app: &TestApp, id: i64) -> String {
        sqlx::query_scalar("SELECT status FROM barangay_yields WHERE id = ?")
            .bind(id)
            .fetch_one(&app.state.db)
            .await
            .unwrap()
    }

    async fn review_logs(app: &TestApp, id: i64) -> i64 {
        count_activity_for_target(&app.state.db, target_tables::BARANGAY_YIELDS, &id.to_string())
            .await
            .unwrap()
            - 1 // the submission itself
    }

    #[tokio::test]
    async fn test_approve_once_with_one_log_entry() {
        let Fixture { app, admin, yield_id, .. } = fixture().await;
        let uri = format!("/api/approvals/approve/barangay-yields/{}", yield_id);

        let first = send(&app, request("POST", &uri, Some(&admin), None)).await;
        assert_eq!(first.status, StatusCode::OK);
        assert_eq!(first.body["data"]["status"], "approved");
        assert_eq!(first.body["data"]["reviewed_by_name"], "Test User");
        assert_eq!(status_of(&app, yield_id).await, "approved");
        assert_eq!(review_logs(&app, yield_id).await, 1);

        let second = send(&app, request("PUT", &uri, Some(&admin), None)).await;
        assert_eq!(second.status, StatusCode::CONFLICT);
        assert_eq!(
            second.body["message"],
            "No pending approval exists for this record (current status: approved)"
        );
        assert_eq!(review_logs(&app, yield_id).await, 1);

        let reject = send(
            &app,
            request(
                "POST",
                &format!("/api/approvals/reject/barangay_yields/{}", yield_id),
                Some(&admin),
                Some(json!({"reason": "late"})),
            ),
        )
        .await;
        assert_eq!(reject.status, StatusCode::CONFLICT);
        assert_eq!(status_of(&app, yield_id).await, "approved");
    }

    #[tokio::test]
    async fn test_reject_requires_reason() {
        let Fixture { app, admin, yield_id, .. } = fixture().await;
        let uri = format!("/api/approvals/reject/barangay_yields/{}", yield_id);

        for body in [None, Some(json!({})), Some(json!({"reason": "   "}))] {
            let response = send(&app, request("POST", &uri, Some(&admin), body)).await;
            assert_eq!(response.status, StatusCode::BAD_REQUEST);
            assert_eq!(response.body["message"], "Rejection reason is required");
        }
        assert_eq!(status_of(&app, yield_id).await, "pending");
        assert_eq!(app.count_logs(actions::REJECT_RECORD).await, 0);

        let rejected = send(
            &app,
            request("POST", &uri, Some(&admin), Some(json!({"reason": "  duplicate entry "}))),
        )
        .await;
        assert_eq!(rejected.status, StatusCode::OK);
        assert_eq!(rejected.body["data"]["rejection_reason"], "duplicate entry");
        assert_eq!(app.count_logs(actions::REJECT_RECORD).await, 1);
    }

    #[tokio::test]
    async fn test_missing_record_and_bad_type() {
        let Fixture { app, admin, .. } = fixture().await;

        let missing = send(
            &app,
            request("POST", "/api/approvals/approve/crop_prices/999", Some(&admin), None),
        )
        .await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert_eq!(missing.body["message"], "crop price record 999 not found");

        let bad_type = send(&app, request("POST", "/api/approvals/approve/users/1", Some(&admin), None)).await;
        assert_eq!(bad_type.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            bad_type.body["message"],
            "Invalid record type: users. Must be one of: barangay_yields, crop_prices"
        );
        assert_eq!(app.count_logs(actions::APPROVE_RECORD).await, 0);
    }

    #[tokio::test]
    async fn test_technicians_cannot_review_but_can_read_status() {
        let Fixture { app, tech, yield_id, .. } = fixture().await;

        let denied = send(
            &app,
            request("POST", &format!("/api/approvals/approve/barangay_yields/{}", yield_id), Some(&tech), None),
        )
        .await;
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
        assert_eq!(status_of(&app, yield_id).await, "pending");

        let status = send(
            &app,
            request("GET", &format!("/api/approvals/status/barangay_yields/{}", yield_id), Some(&tech), None),
        )
        .await;
        assert_eq!(status.status, StatusCode::OK);
        assert_eq!(status.body["data"]["status"], "pending");
    }

    #[tokio::test]
    async fn test_pending_queue_filters() {
        let Fixture { app, admin, yield_id, .. } = fixture().await;

        let queue = send(&app, request("GET", "/api/approvals/pending", Some(&admin), None)).await;
        assert_eq!(queue.status, StatusCode::OK);
        assert_eq!(queue.body["data"]["total"], 1);
        assert_eq!(queue.body["data"]["limit"], 50);
        assert_eq!(queue.body["data"]["items"][0]["record_id"], yield_id);
        assert_eq!(queue.body["data"]["items"][0]["value"], 50.0);

        send(
            &app,
            request("POST", &format!("/api/approvals/approve/barangay_yields/{}", yield_id), Some(&admin), None),
        )
        .await;

        let empty = send(
            &app,
            request("GET", "/api/approvals/pending?recordType=barangay_yields", Some(&admin), None),
        )
        .await;
        assert_eq!(empty.body["data"]["total"], 0);

        let all = send(&app, request("GET", "/api/approvals/pending?status=all", Some(&admin), None)).await;
        assert_eq!(all.body["data"]["total"], 1);

        let bad = send(&app, request("GET", "/api/approvals/pending?recordType=crops", Some(&admin), None)).await;
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    }
}
