//! User management endpoints.
//!
//! Admins manage technician accounts; super-admins manage every role.

use axum::extract::State;
use serde::Serialize;
use std::sync::Arc;

use crate::db::{
    actions, count_users_with_role, delete_user, find_user_by_email, find_user_by_id, insert_user, list_users,
    roles_summary, set_user_password, set_user_verified, target_tables, update_user, CreateUserRequest, NewUser,
    Role, RolesSummary, UpdateUserRequest, User, UserListQuery, UserListResponse, UserResponse,
};
use crate::utils::mask_email;
use crate::AppState;

use super::audit::audit_log;
use super::auth::{generate_temporary_password, hash_password, CurrentUser, INSUFFICIENT_ROLE_MESSAGE};
use super::error::{on_unique_violation, ApiError, ValidationErrorBuilder};
use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::response::ApiResponse;
use super::validation::{validate_contact_number, validate_email, validate_password_strength, validate_person_name};

/// Roles that can be assigned through the management screens
const STAFF_ROLES: [Role; 3] = [Role::SuperAdmin, Role::Admin, Role::Technician];

#[derive(Debug, Serialize)]
pub struct TemporaryPassword {
    pub user_id: String,
    pub temporary_password: String,
}

fn not_found(id: &str) -> ApiError {
    ApiError::not_found(format!("user {} not found", id))
}

/// Load a user the caller wants to manage, enforcing the role hierarchy
async fn managed_user(state: &AppState, current: &CurrentUser, id: &str) -> Result<User, ApiError> {
    let user = find_user_by_id(&state.db, id).await?.ok_or_else(|| not_found(id))?;
    if !current.role.can_manage(user.role_enum()) {
        return Err(ApiError::forbidden(INSUFFICIENT_ROLE_MESSAGE));
    }
    Ok(user)
}

fn parse_role(raw: &str) -> Result<Role, ApiError> {
    raw.parse::<Role>()
        .ok()
        .filter(|r| STAFF_ROLES.contains(r))
        .ok_or_else(|| ApiError::validation_field("role", "Role must be one of: super-admin, admin, technician"))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Result<ApiResponse<UserResponse>, ApiError> {
    current.require_role(Role::REVIEWERS)?;

    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("first_name", validate_person_name(&req.first_name, "First name"))
        .check("last_name", validate_person_name(&req.last_name, "Last name"))
        .check("email", validate_email(&req.email))
        .check("password", validate_password_strength(&req.password))
        .check("contact_number", validate_contact_number(&req.contact_number));
    errors.finish()?;

    let role = match req.role.as_deref() {
        Some(raw) => parse_role(raw)?,
        None => Role::Technician,
    };
    if !current.role.can_manage(role) {
        return Err(ApiError::forbidden(INSUFFICIENT_ROLE_MESSAGE));
    }

    if find_user_by_email(&state.db, &req.email).await?.is_some() {
        return Err(ApiError::conflict("email is already taken"));
    }

    let password_hash =
        hash_password(&req.password).map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    let user = insert_user(
        &state.db,
        &NewUser {
            first_name: &req.first_name,
            last_name: &req.last_name,
            email: &req.email,
            password_hash: &password_hash,
            role,
            is_verified: true,
            contact_number: req.contact_number.as_deref(),
        },
    )
    .await
    .map_err(|e| on_unique_violation(e, "email is already taken"))?;

    tracing::info!(user_id = %user.id, role = %role, created_by = %current.id(), "User created");
    audit_log(
        &state,
        current.activity(
            actions::CREATE_USER,
            target_tables::USERS,
            &user.id,
            serde_json::json!({ "email": mask_email(&user.email), "role": role }),
        ),
    )
    .await;

    Ok(ApiResponse::created("user created successfully", UserResponse::from(user)))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> Result<ApiResponse<UserListResponse>, ApiError> {
    current.require_role(Role::REVIEWERS)?;
    let users = list_users(&state.db, current.role.managed_roles(), &query).await?;
    Ok(ApiResponse::ok("users fetched successfully", users))
}

pub async fn summary(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<ApiResponse<RolesSummary>, ApiError> {
    current.require_role(&[Role::SuperAdmin])?;
    let summary = roles_summary(&state.db).await?;
    Ok(ApiResponse::ok("role summary fetched successfully", summary))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> Result<ApiResponse<UserResponse>, ApiError> {
    if id != current.id() {
        current.require_role(Role::REVIEWERS)?;
    }
    let user = find_user_by_id(&state.db, &id).await?.ok_or_else(|| not_found(&id))?;
    Ok(ApiResponse::ok("user fetched successfully", UserResponse::from(user)))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<ApiResponse<UserResponse>, ApiError> {
    if req.is_empty() {
        return Err(ApiError::bad_request("at least one field must be provided"));
    }

    let is_self = id == current.id();
    let target = if is_self {
        current.user.clone()
    } else {
        current.require_role(Role::REVIEWERS)?;
        managed_user(&state, &current, &id).await?
    };

    let mut errors = ValidationErrorBuilder::new();
    if let Some(first_name) = &req.first_name {
        errors.check("first_name", validate_person_name(first_name, "First name"));
    }
    if let Some(last_name) = &req.last_name {
        errors.check("last_name", validate_person_name(last_name, "Last name"));
    }
    if let Some(email) = &req.email {
        errors.check("email", validate_email(email));
    }
    errors.check("contact_number", validate_contact_number(&req.contact_number));
    errors.finish()?;

    let new_role = match req.role.as_deref() {
        None => None,
        Some(raw) => {
            current.require_role(&[Role::SuperAdmin])?;
            let role = parse_role(raw)?;
            let demoting_last_superadmin = target.role_enum() == Role::SuperAdmin
                && role != Role::SuperAdmin
                && count_users_with_role(&state.db, Role::SuperAdmin).await? <= 1;
            if demoting_last_superadmin {
                return Err(ApiError::bad_request("cannot change the role of the last super-admin"));
            }
            Some(role)
        }
    };

    let user = update_user(&state.db, &target.id, &req, new_role)
        .await
        .map_err(|e| on_unique_violation(e, "email is already taken"))?
        .ok_or_else(|| not_found(&id))?;

    let mut changed: Vec<&str> = Vec::new();
    for (field, present) in [
        ("first_name", req.first_name.is_some()),
        ("last_name", req.last_name.is_some()),
        ("email", req.email.is_some()),
        ("contact_number", req.contact_number.is_some()),
        ("bio", req.bio.is_some()),
        ("role", new_role.is_some()),
    ] {
        if present {
            changed.push(field);
        }
    }

    audit_log(
        &state,
        current.activity(
            actions::UPDATE_USER,
            target_tables::USERS,
            &user.id,
            serde_json::json!({
                "email": mask_email(&user.email),
                "fields": changed,
                "previous_role": target.role,
                "role": user.role,
            }),
        ),
    )
    .await;

    Ok(ApiResponse::ok("user updated successfully", UserResponse::from(user)))
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> Result<ApiResponse<UserResponse>, ApiError> {
    current.require_role(Role::REVIEWERS)?;
    let target = managed_user(&state, &current, &id).await?;

    set_user_verified(&state.db, &target.id, true).await?;
    let user = find_user_by_id(&state.db, &id).await?.ok_or_else(|| not_found(&id))?;

    audit_log(
        &state,
        current.activity(
            actions::VERIFY_USER,
            target_tables::USERS,
            &user.id,
            serde_json::json!({
                "email": mask_email(&user.email),
                "was_verified": target.is_verified,
            }),
        ),
    )
    .await;

    Ok(ApiResponse::ok("user verified successfully", UserResponse::from(user)))
}

/// Issue a one-time temporary password. Existing sessions of the user end.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> Result<ApiResponse<TemporaryPassword>, ApiError> {
    current.require_role(Role::REVIEWERS)?;
    let target = managed_user(&state, &current, &id).await?;

    let temporary = generate_temporary_password();
    let password_hash =
        hash_password(&temporary).map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;
    set_user_password(&state.db, &target.id, &password_hash).await?;
    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(&target.id)
        .execute(&state.db)
        .await?;

    audit_log(
        &state,
        current.activity(
            actions::ISSUE_TEMPORARY_PASSWORD,
            target_tables::USERS,
            &target.id,
            serde_json::json!({ "email": mask_email(&target.email) }),
        ),
    )
    .await;

    Ok(ApiResponse::ok(
        "temporary password issued; share it with the user securely",
        TemporaryPassword {
            user_id: target.id,
            temporary_password: temporary,
        },
    ))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> Result<ApiResponse<()>, ApiError> {
    current.require_role(Role::REVIEWERS)?;
    if id == current.id() {
        return Err(ApiError::bad_request("you cannot delete your own account"));
    }

    let target = managed_user(&state, &current, &id).await?;
    if !delete_user(&state.db, &target.id).await? {
        return Err(not_found(&id));
    }

    tracing::info!(user_id = %target.id, deleted_by = %current.id(), "User deleted");
    audit_log(
        &state,
        current.activity(
            actions::DELETE_USER,
            target_tables::USERS,
            &target.id,
            serde_json::json!({ "email": mask_email(&target.email), "role": target.role }),
        ),
    )
    .await;

    Ok(ApiResponse::message("user deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{request, send, TestApp};
    use axum::http::StatusCode;
    use serde_json::json;

    fn new_user(email: &str, role: &str) -> serde_json::Value {
        json!({
            "first_name": "Juan",
            "last_name": "Dela Cruz",
            "email": email,
            "password": "Harvest#2024",
            "role": role
        })
    }

    #[tokio::test]
    async fn test_admin_creates_only_technicians() {
        let app = TestApp::new().await;
        let (_, admin) = app.create_user("admin@example.com", Role::Admin, true).await;

        let tech = send(&app, request("POST", "/api/user", Some(&admin), Some(new_user("t@example.com", "technician")))).await;
        assert_eq!(tech.status, StatusCode::CREATED);
        assert_eq!(tech.body["data"]["is_verified"], true);

        let other_admin = send(&app, request("POST", "/api/user", Some(&admin), Some(new_user("a@example.com", "admin")))).await;
        assert_eq!(other_admin.status, StatusCode::FORBIDDEN);

        let duplicate = send(&app, request("POST", "/api/user", Some(&admin), Some(new_user("T@example.com", "technician")))).await;
        assert_eq!(duplicate.status, StatusCode::CONFLICT);

        assert_eq!(app.count_logs(actions::CREATE_USER).await, 1);
        let details: String = sqlx::query_scalar("SELECT details FROM activity_logs WHERE action = 'CREATE_USER'")
            .fetch_one(&app.state.db)
            .await
            .unwrap();
        assert!(details.contains("t***@example.com"));
        assert!(!details.contains("Harvest#2024"));
    }

    #[tokio::test]
    async fn test_list_is_scoped_by_role() {
        let app = TestApp::new().await;
        let (_, admin) = app.create_user("admin@example.com", Role::Admin, true).await;
        let (_, root) = app.create_user("root@example.com", Role::SuperAdmin, true).await;
        app.create_user("tech@example.com", Role::Technician, true).await;

        let admin_view = send(&app, request("GET", "/api/user", Some(&admin), None)).await;
        assert_eq!(admin_view.body["data"]["total"], 1);

        let root_view = send(&app, request("GET", "/api/user", Some(&root), None)).await;
        assert_eq!(root_view.body["data"]["total"], 3);

        let filtered = send(&app, request("GET", "/api/user?roles=admin,technician", Some(&root), None)).await;
        assert_eq!(filtered.body["data"]["total"], 2);

        let summary = send(&app, request("GET", "/api/user/roles/summary", Some(&root), None)).await;
        assert_eq!(summary.status, StatusCode::OK);
        assert_eq!(summary.body["data"]["total"], 3);

        let denied = send(&app, request("GET", "/api/user/roles/summary", Some(&admin), None)).await;
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_role_change_requires_superadmin() {
        let app = TestApp::new().await;
        let (_, admin) = app.create_user("admin@example.com", Role::Admin, true).await;
        let (_, root) = app.create_user("root@example.com", Role::SuperAdmin, true).await;
        let (tech, tech_token) = app.create_user("tech@example.com", Role::Technician, true).await;
        let uri = format!("/api/user/{}", tech.id);

        let by_admin = send(&app, request("PUT", &uri, Some(&admin), Some(json!({"role": "admin"})))).await;
        assert_eq!(by_admin.status, StatusCode::FORBIDDEN);

        let self_edit = send(&app, request("PUT", &uri, Some(&tech_token), Some(json!({"bio": "Rice specialist"})))).await;
        assert_eq!(self_edit.status, StatusCode::OK);
        assert_eq!(self_edit.body["data"]["bio"], "Rice specialist");

        let self_promote = send(&app, request("PUT", &uri, Some(&tech_token), Some(json!({"role": "admin"})))).await;
        assert_eq!(self_promote.status, StatusCode::FORBIDDEN);

        let by_root = send(&app, request("PUT", &uri, Some(&root), Some(json!({"role": "admin"})))).await;
        assert_eq!(by_root.status, StatusCode::OK);
        assert_eq!(by_root.body["data"]["role"], "admin");
    }

    #[tokio::test]
    async fn test_verify_and_reset_password() {
        let app = TestApp::new().await;
        let (_, admin) = app.create_user("admin@example.com", Role::Admin, true).await;
        let (pending, pending_token) = app.create_user("new@example.com", Role::Technician, false).await;

        let verified = send(
            &app,
            request("POST", &format!("/api/user/{}/verify", pending.id), Some(&admin), None),
        )
        .await;
        assert_eq!(verified.status, StatusCode::OK);
        assert_eq!(verified.body["data"]["is_verified"], true);

        let me = send(&app, request("GET", "/api/user/me", Some(&pending_token), None)).await;
        assert_eq!(me.status, StatusCode::OK);

        let reset = send(
            &app,
            request("POST", &format!("/api/user/{}/reset-password", pending.id), Some(&admin), None),
        )
        .await;
        assert_eq!(reset.status, StatusCode::OK);
        let temporary = reset.body["data"]["temporary_password"].as_str().unwrap().to_string();
        assert_eq!(temporary.len(), 12);

        // Old sessions end; the temporary password logs in
        let after = send(&app, request("GET", "/api/user/me", Some(&pending_token), None)).await;
        assert_eq!(after.status, StatusCode::UNAUTHORIZED);
        let login = send(
            &app,
            request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"email": "new@example.com", "password": temporary})),
            ),
        )
        .await;
        assert_eq!(login.status, StatusCode::OK);

        let details: String =
            sqlx::query_scalar("SELECT details FROM activity_logs WHERE action = 'ISSUE_TEMPORARY_PASSWORD'")
                .fetch_one(&app.state.db)
                .await
                .unwrap();
        assert!(!details.contains(&temporary));
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let app = TestApp::new().await;
        let (admin_user, admin) = app.create_user("admin@example.com", Role::Admin, true).await;
        let (other_admin, _) = app.create_user("admin2@example.com", Role::Admin, true).await;
        let (tech, _) = app.create_user("tech@example.com", Role::Technician, true).await;

        let missing = send(&app, request("DELETE", "/api/user/no-such-user", Some(&admin), None)).await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let own = send(&app, request("DELETE", &format!("/api/user/{}", admin_user.id), Some(&admin), None)).await;
        assert_eq!(own.status, StatusCode::BAD_REQUEST);

        let peer = send(&app, request("DELETE", &format!("/api/user/{}", other_admin.id), Some(&admin), None)).await;
        assert_eq!(peer.status, StatusCode::FORBIDDEN);

        assert_eq!(app.count_logs(actions::DELETE_USER).await, 0);

        let ok = send(&app, request("DELETE", &format!("/api/user/{}", tech.id), Some(&admin), None)).await;
        assert_eq!(ok.status, StatusCode::OK);
        assert_eq!(app.count_logs(actions::DELETE_USER).await, 1);
        assert!(find_user_by_id(&app.state.db, &tech.id).await.unwrap().is_none());
    }
}
