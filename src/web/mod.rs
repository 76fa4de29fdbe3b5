//! HTTP surface for profile management.
//!
//! Routing, multipart decoding and error-to-status mapping only; every
//! consistency decision is made by the coordinator.

mod handlers;

pub use handlers::{ApiMessage, delete_user, get_user, healthcheck};

use crate::coordinator::ProfileAssetCoordinator;
use crate::core::AssetError;
use axum::Json;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::extract::multipart::MultipartRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Upload size accepted when no limit is configured.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ProfileAssetCoordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<ProfileAssetCoordinator>) -> Self {
        Self { coordinator }
    }
}

pub fn build_router(state: AppState) -> Router {
    build_router_with_limit(state, DEFAULT_MAX_UPLOAD_BYTES)
}

pub fn build_router_with_limit(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/users", post(handlers::create_user))
        .route(
            "/users/:id",
            get(get_user)
                .put(handlers::replace_picture)
                .delete(delete_user),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    Asset(AssetError),
    Input(String),
}

impl From<AssetError> for WebError {
    fn from(err: AssetError) -> Self {
        WebError::Asset(err)
    }
}

impl From<MultipartRejection> for WebError {
    fn from(err: MultipartRejection) -> Self {
        WebError::Input(err.body_text())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            WebError::Asset(AssetError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                format!("User '{}' not found", id),
                "not_found",
            ),
            WebError::Asset(AssetError::Validation(msg)) | WebError::Input(msg) => {
                (StatusCode::BAD_REQUEST, msg, "input_error")
            }
            // Everything else collapses into one generic failure; details go to the log.
            WebError::Asset(err) => {
                error!(error = %err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                    "internal_error",
                )
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;
