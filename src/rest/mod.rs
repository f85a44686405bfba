//! REST surface of the daemon.
//!
//! Route paths and response shapes follow the editor front end's wire
//! contract: camelCase JSON bodies, `{"error": ...}` failures, and the
//! Vditor envelope on image uploads.

pub mod routes;

use anyhow::{Context as _, Result};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::AppContext;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) | ApiError::NotADirectory(_) | ApiError::AlreadyExists(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BuildInProgress(_) => StatusCode::CONFLICT,
            ApiError::ExternalTool { .. } => StatusCode::BAD_GATEWAY,
            ApiError::RelocateFailed(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!(%self, "request failed");
        } else {
            warn!(%self, "request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route(
            "/api/create-folder-session",
            post(routes::sessions::create_folder_session),
        )
        .route(
            "/api/get-folder-session",
            get(routes::sessions::get_folder_session),
        )
        .route("/api/get-all-sessions", get(routes::sessions::get_all_sessions))
        .route(
            "/api/create-website-session",
            post(routes::sessions::create_website_session),
        )
        .route("/api/edit-session", post(routes::sessions::edit_session))
        .route("/api/delete-session", post(routes::sessions::delete_session))
        .route("/api/read-folder", post(routes::sessions::read_folder))
        .route("/api/export-book", post(routes::sessions::export_book))
        .route("/api/file-content", get(routes::files::file_content))
        .route("/api/save-file", post(routes::files::save_file))
        .route("/api/create-file", post(routes::files::create_file))
        .route("/api/create-folder", post(routes::files::create_folder))
        .route("/api/delete-item", post(routes::files::delete_item))
        .route("/api/upload-file", post(routes::uploads::upload_file))
        .route("/api/upload-image", post(routes::uploads::upload_image))
        .route(
            "/api/upload-image-from-url",
            post(routes::uploads::upload_image_from_url),
        )
        .route("/api/get-image/{filename}", get(routes::uploads::get_image))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Bind and serve until the process is stopped.
pub async fn serve(ctx: AppContext) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, build_router(ctx))
        .await
        .context("server error")?;
    Ok(())
}
