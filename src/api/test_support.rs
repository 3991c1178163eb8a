//! Router-level test fixtures: an in-memory database, seeded users and a
//! small request/response wrapper around `tower::ServiceExt::oneshot`.

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::config::Config;
use crate::db::{insert_barangay, insert_crop, insert_user, NewUser, Role, User};
use crate::AppState;

use super::auth::{create_session, hash_password};
use super::create_router;

pub(crate) struct TestApp {
    pub state: Arc<AppState>,
    /// Keeps the data and backup directories alive for the test's duration
    _dir: TempDir,
}

pub(crate) struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Bytes,
    pub body: serde_json::Value,
    pub set_cookie: Option<String>,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.server.data_dir = dir.path().to_path_buf();
        config.backups.directory = dir.path().join("backups");
        config.backups.max_size_mb = 1;

        let db = crate::db::init_in_memory().await.unwrap();
        Self {
            state: Arc::new(AppState::new(config, db)),
            _dir: dir,
        }
    }

    async fn insert(&self, email: &str, password_hash: &str, role: Role, verified: bool) -> (User, String) {
        let user = insert_user(
            &self.state.db,
            &NewUser {
                first_name: "Test",
                last_name: "User",
                email,
                password_hash,
                role,
                is_verified: verified,
                contact_number: None,
            },
        )
        .await
        .unwrap();
        let token = create_session(&self.state.db, &self.state.config.auth, &user.id)
            .await
            .unwrap();
        (user, token)
    }

    /// User with an unusable password and a live session
    pub async fn create_user(&self, email: &str, role: Role, verified: bool) -> (User, String) {
        self.insert(email, "not-a-hash", role, verified).await
    }

    pub async fn create_user_with_password(
        &self,
        email: &str,
        password: &str,
        role: Role,
        verified: bool,
    ) -> (User, String) {
        let hash = hash_password(password).unwrap();
        self.insert(email, &hash, role, verified).await
    }

    /// One barangay and one crop; returns their ids
    pub async fn seed_reference(&self) -> (i64, i64) {
        let barangay = insert_barangay(&self.state.db, "San Pablo", Some("0305410001"), Some("Guagua"), None)
            .await
            .unwrap();
        let crop = insert_crop(&self.state.db, "Rice", Some("cereal")).await.unwrap();
        (barangay.id, crop.id)
    }

    pub async fn count_logs(&self, action: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM activity_logs WHERE action = ?")
            .bind(action)
            .fetch_one(&self.state.db)
            .await
            .unwrap()
    }
}

pub(crate) fn request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub(crate) async fn send(app: &TestApp, request: Request<Body>) -> TestResponse {
    let response = create_router(app.state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let set_cookie = headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);

    TestResponse {
        status,
        headers,
        bytes,
        body,
        set_cookie,
    }
}
