//! Document CRUD endpoints.

use std::path::PathBuf;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::scan::Node;
use crate::AppContext;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePathQuery {
    pub file_path: String,
}

pub async fn file_content(
    State(ctx): State<AppContext>,
    Query(query): Query<FilePathQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let content = ctx.files.read_file(&PathBuf::from(&query.file_path)).await?;
    Ok(Json(serde_json::json!({ "content": content })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveFileRequest {
    pub file_path: String,
    pub content: String,
}

pub async fn save_file(
    State(ctx): State<AppContext>,
    Json(req): Json<SaveFileRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    ctx.files
        .write_file(&PathBuf::from(&req.file_path), &req.content)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileRequest {
    pub folder_path: String,
    pub file_name: String,
}

pub async fn create_file(
    State(ctx): State<AppContext>,
    Json(req): Json<CreateFileRequest>,
) -> ApiResult<Json<Node>> {
    let node = ctx
        .files
        .create_file(&PathBuf::from(&req.folder_path), &req.file_name)
        .await?;
    Ok(Json(node))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    pub parent_path: String,
    pub folder_name: String,
}

pub async fn create_folder(
    State(ctx): State<AppContext>,
    Json(req): Json<CreateFolderRequest>,
) -> ApiResult<Json<Node>> {
    let node = ctx
        .files
        .create_folder(&PathBuf::from(&req.parent_path), &req.folder_name)
        .await?;
    Ok(Json(node))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteItemRequest {
    pub file_path: String,
    #[serde(default)]
    pub is_folder: bool,
}

pub async fn delete_item(
    State(ctx): State<AppContext>,
    Json(req): Json<DeleteItemRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = PathBuf::from(&req.file_path);
    ctx.files.delete_item(&path, req.is_folder).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("{name} deleted"),
    })))
}
