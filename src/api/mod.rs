mod approvals;
pub mod audit;
pub mod auth;
mod backups;
mod barangays;
mod crop_prices;
mod crops;
pub mod error;
pub mod extract;
pub mod response;
mod submissions;
mod users;
pub mod validation;
mod yields;

#[cfg(test)]
pub(crate) mod test_support;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

/// Multipart framing on top of the raw backup size
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true);

    match HeaderValue::from_str(origin) {
        Ok(value) => cors.allow_origin(value),
        Err(e) => {
            tracing::warn!(origin, error = %e, "Invalid server.cors_origin, cross-origin requests will be refused");
            cors
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/admin/login", post(auth::admin_login))
        .route("/logout", post(auth::logout))
        .route("/change-password", patch(auth::change_password))
        .route("/me", get(auth::me));

    let user_routes = Router::new()
        .route("/", get(users::list).post(users::create))
        .route("/me", get(auth::me))
        .route("/roles/summary", get(users::summary))
        .route("/:id", get(users::get_user).put(users::update).delete(users::delete))
        .route("/:id/verify", post(users::verify))
        .route("/:id/reset-password", post(users::reset_password));

    let yield_routes = Router::new()
        .route("/", get(yields::list).post(yields::create_yield))
        .route("/public/approved", get(yields::list_public))
        .route(
            "/:id",
            get(yields::get_yield).put(yields::update_yield).delete(yields::delete_yield),
        );

    let price_routes = Router::new()
        .route("/", get(crop_prices::list).post(crop_prices::create_price))
        .route("/public/approved", get(crop_prices::list_public))
        .route(
            "/:id",
            get(crop_prices::get_price)
                .put(crop_prices::update_price)
                .delete(crop_prices::delete_price),
        );

    let approval_routes = Router::new()
        .route("/pending", get(approvals::pending))
        .route(
            "/approve/:record_type/:record_id",
            post(approvals::approve).put(approvals::approve),
        )
        .route(
            "/reject/:record_type/:record_id",
            post(approvals::reject).put(approvals::reject),
        )
        .route("/status/:record_type/:record_id", get(approvals::status));

    let log_routes = Router::new()
        .route("/", get(audit::list_logs))
        .route("/my-logs", get(audit::my_logs))
        .route("/actions", get(audit::list_action_types));

    let crop_routes = Router::new()
        .route("/", get(crops::list).post(crops::create_crop))
        .route("/dropdown", get(crops::dropdown))
        .route("/:id", get(crops::get_crop).put(crops::update).delete(crops::delete));

    let barangay_routes = Router::new()
        .route("/", get(barangays::list).post(barangays::create_barangay))
        .route("/dropdown", get(barangays::dropdown))
        .route(
            "/:id",
            get(barangays::get_barangay)
                .put(barangays::update)
                .delete(barangays::delete),
        );

    let upload_limit = state.config.backups.max_size_bytes() as usize + MULTIPART_OVERHEAD_BYTES;
    let backup_routes = Router::new()
        .route("/", get(backups::list).post(backups::upload))
        .route("/:id", axum::routing::delete(backups::delete))
        .route("/:id/download", get(backups::download))
        .layer(DefaultBodyLimit::max(upload_limit));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api/user", user_routes)
        .nest("/api/barangay-yields", yield_routes)
        .nest("/api/barangay-crop-prices", price_routes)
        .nest("/api/approvals", approval_routes)
        .nest("/api/logs", log_routes)
        .nest("/api/crops", crop_routes)
        .nest("/api/barangays", barangay_routes)
        .nest("/api/backups", backup_routes)
        .layer(cors_layer(&state.config.server.cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
