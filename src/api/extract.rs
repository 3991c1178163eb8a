//! Request extractors whose rejections use the API error envelope.
//!
//! axum's own `Json`, `Path` and `Query` reject with plain-text bodies (and a
//! 422 for well-formed JSON of the wrong shape). These wrappers run the same
//! extraction and turn every rejection into a 400 `ApiError`.

use axum::extract::{FromRequest, FromRequestParts};

use super::error::ApiError;

/// JSON request body
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Typed path parameters
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// Typed query string
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);
