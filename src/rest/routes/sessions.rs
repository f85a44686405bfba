//! Session lifecycle endpoints.

use std::path::PathBuf;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::registry::SessionSummary;
use crate::scan::Node;
use crate::AppContext;

/// Session read payload: current folder plus a fresh snapshot.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub structure: Vec<Node>,
    pub folder_path: PathBuf,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderSessionRequest {
    pub folder_path: String,
}

pub async fn create_folder_session(
    State(ctx): State<AppContext>,
    Json(req): Json<CreateFolderSessionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let session_id = ctx
        .registry
        .create_or_get(PathBuf::from(&req.folder_path).as_path())
        .await?;
    Ok(Json(serde_json::json!({ "sessionId": session_id })))
}

#[derive(Deserialize)]
pub struct SessionIdQuery {
    pub id: String,
}

pub async fn get_folder_session(
    State(ctx): State<AppContext>,
    Query(query): Query<SessionIdQuery>,
) -> ApiResult<Json<SessionResponse>> {
    let snapshot = ctx.registry.get(&query.id).await?;
    Ok(Json(SessionResponse {
        structure: snapshot.structure,
        folder_path: snapshot.folder_path,
    }))
}

#[derive(Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

pub async fn get_all_sessions(
    State(ctx): State<AppContext>,
) -> ApiResult<Json<SessionListResponse>> {
    let sessions = ctx.registry.list().await?;
    Ok(Json(SessionListResponse { sessions }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebsiteSessionRequest {
    pub folder_name: String,
}

/// Scaffold a new site folder, then bind it like any other directory.
pub async fn create_website_session(
    State(ctx): State<AppContext>,
    Json(req): Json<CreateWebsiteSessionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let folder = ctx.scaffolder.bootstrap(&req.folder_name).await?;
    let session_id = ctx.registry.create_or_get(&folder).await?;
    Ok(Json(serde_json::json!({ "sessionId": session_id })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditSessionRequest {
    pub session_id: String,
    pub new_name: String,
}

pub async fn edit_session(
    State(ctx): State<AppContext>,
    Json(req): Json<EditSessionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let new_folder = ctx.registry.rename(&req.session_id, &req.new_name).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "newFolderPath": new_folder,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdRequest {
    pub session_id: String,
}

pub async fn delete_session(
    State(ctx): State<AppContext>,
    Json(req): Json<SessionIdRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    ctx.registry.deregister(&req.session_id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadFolderRequest {
    pub folder_path: String,
}

/// Sessionless structure read of an arbitrary directory.
pub async fn read_folder(
    State(ctx): State<AppContext>,
    Json(req): Json<ReadFolderRequest>,
) -> ApiResult<Json<Vec<Node>>> {
    let structure = ctx
        .registry
        .scan_folder(PathBuf::from(&req.folder_path).as_path())
        .await?;
    Ok(Json(structure))
}

pub async fn export_book(
    State(ctx): State<AppContext>,
    Json(req): Json<SessionIdRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if req.session_id.is_empty() {
        return Err(ApiError::Validation("sessionId must not be empty".to_string()));
    }
    let outcome = ctx.exporter.export(&req.session_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "output": outcome.build_output,
        "bookPath": outcome.artifact_path,
    })))
}
