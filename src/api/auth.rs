use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::{seq::SliceRandom, Rng};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::config::{AuthConfig, Config};
use crate::db::{
    actions, count_users_with_role, find_user_by_email, find_user_by_id, insert_user, set_user_password,
    target_tables, ChangePasswordRequest, LoginRequest, LoginResponse, NewActivityLog, NewUser,
    RegisterRequest, Role, Session, User, UserResponse,
};
use crate::utils::mask_email;
use crate::AppState;

use super::audit::audit_log;
use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::ApiJson;
use super::response::ApiResponse;
use super::validation::{
    validate_contact_number, validate_email, validate_password_strength, validate_person_name,
};

pub const UNVERIFIED_MESSAGE: &str = "forbidden: please verify your email first";
pub const INSUFFICIENT_ROLE_MESSAGE: &str = "forbidden: insufficient permissions";

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random session token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
pub(crate) fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a 12 character temporary password that satisfies the strength rules
pub fn generate_temporary_password() -> String {
    const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
    const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
    const DIGITS: &[u8] = b"23456789";
    const SPECIAL: &[u8] = b"!@#$%^&*?";

    let mut rng = rand::rng();
    let mut pick = |set: &[u8]| set[rng.random_range(0..set.len())] as char;

    let mut chars: Vec<char> = vec![pick(UPPER), pick(LOWER), pick(DIGITS), pick(SPECIAL)];
    let all: Vec<u8> = [UPPER, LOWER, DIGITS, SPECIAL].concat();
    while chars.len() < 12 {
        chars.push(pick(&all));
    }
    chars.shuffle(&mut rand::rng());
    chars.into_iter().collect()
}

/// Create a session row and return the raw token handed to the client
pub async fn create_session(
    pool: &sqlx::SqlitePool,
    auth: &AuthConfig,
    user_id: &str,
) -> Result<String, sqlx::Error> {
    let token = generate_token();
    let token_hash = hash_token(&token);
    let expires_at = (chrono::Utc::now() + chrono::Duration::days(auth.session_ttl_days))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    let session_id = uuid::Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO sessions (id, user_id, token_hash, expires_at) VALUES (?, ?, ?, ?)")
        .bind(&session_id)
        .bind(user_id)
        .bind(&token_hash)
        .bind(&expires_at)
        .execute(pool)
        .await?;

    Ok(token)
}

fn session_cookie(auth: &AuthConfig, token: String) -> Cookie<'static> {
    Cookie::build((auth.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(auth.secure_cookies)
        .build()
}

/// Extract the session token from the Authorization header or the session cookie
fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(auth_header) = headers.get("Authorization").and_then(|h| h.to_str().ok()) {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// The authenticated, verified caller of a request
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub role: Role,
    pub session_id: String,
}

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.user.id
    }

    /// Fail with 403 unless the caller holds one of `allowed`
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::forbidden(INSUFFICIENT_ROLE_MESSAGE))
        }
    }

    pub fn is_reviewer(&self) -> bool {
        self.role.is_reviewer()
    }

    /// Activity log entry attributed to this user
    pub fn activity<'a>(
        &'a self,
        action: &'a str,
        target_table: &'a str,
        target_id: impl ToString,
        details: serde_json::Value,
    ) -> NewActivityLog<'a> {
        NewActivityLog {
            user_id: Some(&self.user.id),
            role: Some(self.role.as_str()),
            action,
            target_table: Some(target_table),
            target_id: Some(target_id.to_string()),
            details: Some(details),
        }
    }
}

/// Resolve a token to its live session and user
pub async fn get_current_user(pool: &sqlx::SqlitePool, token: &str) -> Result<(Session, User), ApiError> {
    let token_hash = hash_token(token);
    let session: Option<Session> = sqlx::query_as(
        "SELECT * FROM sessions WHERE token_hash = ? AND expires_at > datetime('now')",
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?;

    let session = session.ok_or_else(|| ApiError::unauthorized("unauthorized: invalid or expired session"))?;

    // Guard against hash collisions in the index lookup
    if !bool::from(session.token_hash.as_bytes().ct_eq(token_hash.as_bytes())) {
        return Err(ApiError::unauthorized("unauthorized: invalid or expired session"));
    }

    let user = find_user_by_id(pool, &session.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("unauthorized: user no longer exists"))?;

    Ok((session, user))
}

/// Extractor for the current authenticated user
#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers, &state.config.auth.cookie_name)
            .ok_or_else(|| ApiError::unauthorized("unauthorized: no session token provided"))?;

        let (session, user) = get_current_user(&state.db, &token).await?;

        if !user.is_verified {
            return Err(ApiError::forbidden(UNVERIFIED_MESSAGE));
        }

        let role = user.role_enum();
        Ok(CurrentUser {
            user,
            role,
            session_id: session.id,
        })
    }
}

async fn authenticate(state: &AppState, request: &LoginRequest) -> Result<User, ApiError> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("email and password are required"));
    }

    let user = find_user_by_email(&state.db, &request.email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid email or password"))?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::unauthorized("invalid email or password"));
    }

    if !user.is_verified {
        return Err(ApiError::forbidden(UNVERIFIED_MESSAGE));
    }

    Ok(user)
}

async fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: User,
    action: &str,
) -> Result<(CookieJar, ApiResponse<LoginResponse>), ApiError> {
    let token = create_session(&state.db, &state.config.auth, &user.id).await?;
    let role = user.role_enum();

    audit_log(
        state,
        NewActivityLog {
            user_id: Some(&user.id),
            role: Some(role.as_str()),
            action,
            target_table: Some(target_tables::USERS),
            target_id: Some(user.id.clone()),
            details: Some(serde_json::json!({ "email": mask_email(&user.email) })),
        },
    )
    .await;

    tracing::info!(user_id = %user.id, role = %role, "User logged in");

    let jar = jar.add(session_cookie(&state.config.auth, token.clone()));
    Ok((
        jar,
        ApiResponse::ok(
            "login successful",
            LoginResponse {
                token,
                user: UserResponse::from(user),
            },
        ),
    ))
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<(CookieJar, ApiResponse<LoginResponse>), ApiError> {
    let user = authenticate(&state, &request).await?;
    start_session(&state, jar, user, actions::LOGIN_USER).await
}

/// Login endpoint for the admin console; only reviewers may use it
pub async fn admin_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<(CookieJar, ApiResponse<LoginResponse>), ApiError> {
    let user = authenticate(&state, &request).await?;
    if !user.role_enum().is_reviewer() {
        return Err(ApiError::forbidden("account does not have administrative access"));
    }
    start_session(&state, jar, user, actions::LOGIN_ADMIN).await
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    current: CurrentUser,
) -> Result<(CookieJar, ApiResponse<()>), ApiError> {
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(&current.session_id)
        .execute(&state.db)
        .await?;

    audit_log(
        &state,
        current.activity(
            actions::LOGOUT_USER,
            target_tables::USERS,
            current.id(),
            serde_json::json!({}),
        ),
    )
    .await;

    let removal = Cookie::build((state.config.auth.cookie_name.clone(), "")).path("/").build();
    Ok((jar.remove(removal), ApiResponse::message("logged out successfully")))
}

/// Self-registration. New accounts stay unverified until an admin verifies them.
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<ApiResponse<UserResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("first_name", validate_person_name(&request.first_name, "First name"))
        .check("last_name", validate_person_name(&request.last_name, "Last name"))
        .check("email", validate_email(&request.email))
        .check("password", validate_password_strength(&request.password))
        .check("contact_number", validate_contact_number(&request.contact_number));
    if let Some(confirm) = &request.confirm_password {
        if confirm != &request.password {
            errors.add("confirm_password", "Passwords do not match");
        }
    }
    errors.finish()?;

    let role = match request.role.as_deref() {
        None => Role::Technician,
        Some(raw) => match raw.parse::<Role>() {
            Ok(role @ (Role::Technician | Role::Farmer)) => role,
            _ => return Err(ApiError::validation_field("role", "Role must be technician or farmer")),
        },
    };

    if find_user_by_email(&state.db, &request.email).await?.is_some() {
        return Err(ApiError::conflict("email is already taken"));
    }

    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    let user = insert_user(
        &state.db,
        &NewUser {
            first_name: &request.first_name,
            last_name: &request.last_name,
            email: &request.email,
            password_hash: &password_hash,
            role,
            is_verified: false,
            contact_number: request.contact_number.as_deref(),
        },
    )
    .await?;

    audit_log(
        &state,
        NewActivityLog {
            user_id: Some(&user.id),
            role: Some(role.as_str()),
            action: actions::REGISTER_USER,
            target_table: Some(target_tables::USERS),
            target_id: Some(user.id.clone()),
            details: Some(serde_json::json!({ "email": mask_email(&user.email), "role": role })),
        },
    )
    .await;

    Ok(ApiResponse::created(
        "registration successful; an administrator must verify the account before login",
        UserResponse::from(user),
    ))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiJson(request): ApiJson<ChangePasswordRequest>,
) -> Result<ApiResponse<()>, ApiError> {
    if !verify_password(&request.current_password, &current.user.password_hash) {
        return Err(ApiError::validation_field("current_password", "Current password is incorrect"));
    }
    validate_password_strength(&request.new_password)
        .map_err(|e| ApiError::validation_field("new_password", e))?;
    if request.new_password == request.current_password {
        return Err(ApiError::validation_field(
            "new_password",
            "New password must differ from the current password",
        ));
    }

    let password_hash = hash_password(&request.new_password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;
    set_user_password(&state.db, current.id(), &password_hash).await?;

    // Other devices must sign in again
    sqlx::query("DELETE FROM sessions WHERE user_id = ? AND id != ?")
        .bind(current.id())
        .bind(&current.session_id)
        .execute(&state.db)
        .await?;

    audit_log(
        &state,
        current.activity(
            actions::CHANGE_PASSWORD,
            target_tables::USERS,
            current.id(),
            serde_json::json!({}),
        ),
    )
    .await;

    Ok(ApiResponse::message("password changed successfully"))
}

pub async fn me(current: CurrentUser) -> ApiResponse<UserResponse> {
    ApiResponse::ok("user fetched successfully", UserResponse::from(current.user))
}

/// Create the bootstrap super-admin from config when none exists yet
pub async fn ensure_superadmin(pool: &sqlx::SqlitePool, config: &Config) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (
        config.auth.superadmin_email.as_deref(),
        config.auth.superadmin_password.as_deref(),
    ) else {
        return Ok(());
    };

    if count_users_with_role(pool, Role::SuperAdmin).await? > 0 {
        return Ok(());
    }

    validate_email(email).map_err(anyhow::Error::msg)?;
    if let Err(e) = validate_password_strength(password) {
        anyhow::bail!("auth.superadmin_password is too weak: {}", e);
    }

    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    insert_user(
        pool,
        &NewUser {
            first_name: "Super",
            last_name: "Admin",
            email,
            password_hash: &password_hash,
            role: Role::SuperAdmin,
            is_verified: true,
            contact_number: None,
        },
    )
    .await?;

    tracing::info!("Created bootstrap super-admin {}", mask_email(email));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{request, send, TestApp};
    use crate::db::Role;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("Harvest#2024").unwrap();
        assert!(verify_password("Harvest#2024", &hash));
        assert!(!verify_password("harvest#2024", &hash));
        assert!(!verify_password("anything", "not-a-hash"));
    }

    #[test]
    fn test_temporary_password_meets_rules() {
        for _ in 0..20 {
            let password = generate_temporary_password();
            assert_eq!(password.chars().count(), 12);
            assert!(validate_password_strength(&password).is_ok(), "{password}");
        }
    }

    #[test]
    fn test_extract_token_prefers_bearer_then_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", "token=from-cookie; other=1".parse().unwrap());
        assert_eq!(extract_token(&headers, "token").as_deref(), Some("from-cookie"));

        headers.insert("Authorization", "Bearer from-header".parse().unwrap());
        assert_eq!(extract_token(&headers, "token").as_deref(), Some("from-header"));

        assert_eq!(extract_token(&HeaderMap::new(), "token"), None);
    }

    #[tokio::test]
    async fn test_login_sets_cookie_and_logs() {
        let app = TestApp::new().await;
        app.create_user_with_password("tech@example.com", "Harvest#2024", Role::Technician, true)
            .await;

        let response = send(
            &app,
            request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"email": "tech@example.com", "password": "Harvest#2024"})),
            ),
        )
        .await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.set_cookie.unwrap().starts_with("token="));
        let token = response.body["data"]["token"].as_str().unwrap().to_string();

        let me = send(&app, request("GET", "/api/auth/me", Some(&token), None)).await;
        assert_eq!(me.status, StatusCode::OK);
        assert_eq!(me.body["data"]["email"], "tech@example.com");
        assert!(me.body["data"].get("password_hash").is_none());

        assert_eq!(app.count_logs(actions::LOGIN_USER).await, 1);
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials_and_unverified() {
        let app = TestApp::new().await;
        app.create_user_with_password("new@example.com", "Harvest#2024", Role::Technician, false)
            .await;

        let wrong = send(
            &app,
            request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"email": "new@example.com", "password": "Wrong#2024"})),
            ),
        )
        .await;
        assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

        let unverified = send(
            &app,
            request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"email": "new@example.com", "password": "Harvest#2024"})),
            ),
        )
        .await;
        assert_eq!(unverified.status, StatusCode::FORBIDDEN);
        assert_eq!(unverified.body["message"], UNVERIFIED_MESSAGE);
    }

    #[tokio::test]
    async fn test_admin_login_requires_reviewer_role() {
        let app = TestApp::new().await;
        app.create_user_with_password("tech@example.com", "Harvest#2024", Role::Technician, true)
            .await;
        app.create_user_with_password("admin@example.com", "Harvest#2024", Role::Admin, true)
            .await;

        let tech = send(
            &app,
            request(
                "POST",
                "/api/auth/admin/login",
                None,
                Some(json!({"email": "tech@example.com", "password": "Harvest#2024"})),
            ),
        )
        .await;
        assert_eq!(tech.status, StatusCode::FORBIDDEN);

        let admin = send(
            &app,
            request(
                "POST",
                "/api/auth/admin/login",
                None,
                Some(json!({"email": "admin@example.com", "password": "Harvest#2024"})),
            ),
        )
        .await;
        assert_eq!(admin.status, StatusCode::OK);
        assert_eq!(app.count_logs(actions::LOGIN_ADMIN).await, 1);
    }

    #[tokio::test]
    async fn test_register_creates_unverified_technician() {
        let app = TestApp::new().await;
        let body = json!({
            "first_name": "Maria",
            "last_name": "Santos",
            "email": "maria@example.com",
            "password": "Palay#2024",
            "confirm_password": "Palay#2024"
        });

        let created = send(&app, request("POST", "/api/auth/register", None, Some(body.clone()))).await;
        assert_eq!(created.status, StatusCode::CREATED);
        assert_eq!(created.body["data"]["role"], "technician");
        assert_eq!(created.body["data"]["is_verified"], false);

        let duplicate = send(&app, request("POST", "/api/auth/register", None, Some(body))).await;
        assert_eq!(duplicate.status, StatusCode::CONFLICT);

        let weak = send(
            &app,
            request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({
                    "first_name": "A", "last_name": "B",
                    "email": "weak@example.com", "password": "password"
                })),
            ),
        )
        .await;
        assert_eq!(weak.status, StatusCode::BAD_REQUEST);

        let details: Vec<String> = sqlx::query_scalar("SELECT details FROM activity_logs")
            .fetch_all(&app.state.db)
            .await
            .unwrap();
        assert_eq!(details.len(), 1);
        assert!(!details[0].contains("Palay#2024"));
        assert!(details[0].contains("ma***@example.com"));
    }

    #[tokio::test]
    async fn test_unverified_session_is_forbidden() {
        let app = TestApp::new().await;
        let (_, token) = app.create_user("pending@example.com", Role::Technician, false).await;

        let response = send(&app, request("GET", "/api/auth/me", Some(&token), None)).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);

        let anonymous = send(&app, request("GET", "/api/auth/me", None, None)).await;
        assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let app = TestApp::new().await;
        let (_, token) = app.create_user("tech@example.com", Role::Technician, true).await;

        let out = send(&app, request("POST", "/api/auth/logout", Some(&token), None)).await;
        assert_eq!(out.status, StatusCode::OK);

        let after = send(&app, request("GET", "/api/auth/me", Some(&token), None)).await;
        assert_eq!(after.status, StatusCode::UNAUTHORIZED);
        assert_eq!(app.count_logs(actions::LOGOUT_USER).await, 1);
    }

    #[tokio::test]
    async fn test_change_password() {
        let app = TestApp::new().await;
        let (_, token) = app
            .create_user_with_password("tech@example.com", "Harvest#2024", Role::Technician, true)
            .await;

        let wrong = send(
            &app,
            request(
                "PATCH",
                "/api/auth/change-password",
                Some(&token),
                Some(json!({"current_password": "Nope#2024", "new_password": "Planting#2025"})),
            ),
        )
        .await;
        assert_eq!(wrong.status, StatusCode::BAD_REQUEST);

        let ok = send(
            &app,
            request(
                "PATCH",
                "/api/auth/change-password",
                Some(&token),
                Some(json!({"current_password": "Harvest#2024", "new_password": "Planting#2025"})),
            ),
        )
        .await;
        assert_eq!(ok.status, StatusCode::OK);

        let login = send(
            &app,
            request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({"email": "tech@example.com", "password": "Planting#2025"})),
            ),
        )
        .await;
        assert_eq!(login.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ensure_superadmin_bootstrap() {
        let pool = crate::db::init_in_memory().await.unwrap();
        let mut config = Config::default();
        config.auth.superadmin_email = Some("root@example.com".into());
        config.auth.superadmin_password = Some("Bootstrap#2024".into());

        ensure_superadmin(&pool, &config).await.unwrap();
        ensure_superadmin(&pool, &config).await.unwrap();
        assert_eq!(count_users_with_role(&pool, Role::SuperAdmin).await.unwrap(), 1);

        config.auth.superadmin_password = Some("weak".into());
        let fresh = crate::db::init_in_memory().await.unwrap();
        assert!(ensure_superadmin(&fresh, &config).await.is_err());
    }
}
