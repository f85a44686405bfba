//! Upload endpoints and the image pool.
//!
//! Image responses use the Vditor envelope the editor consumes directly:
//! `{"msg": "", "code": 0, "data": {"errFiles": [], "succMap": {...}}}`.

use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::AppContext;

fn multipart_err(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::Validation(format!("invalid multipart body: {err}"))
}

fn image_url(ctx: &AppContext, stored: &str) -> String {
    format!("{}/api/get-image/{stored}", ctx.config.base_url())
}

/// Upload a document into a session folder. Expects a `folderPath` text
/// field followed by one file field.
pub async fn upload_file(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> ApiResult<Json<crate::scan::Node>> {
    let mut folder_path: Option<String> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_err)? {
        if field.name() == Some("folderPath") {
            folder_path = Some(field.text().await.map_err(multipart_err)?);
        } else {
            let name = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| ApiError::Validation("file part has no filename".to_string()))?;
            let bytes = field.bytes().await.map_err(multipart_err)?;
            file = Some((name, bytes.to_vec()));
        }
    }

    let folder_path = folder_path
        .ok_or_else(|| ApiError::Validation("missing folderPath field".to_string()))?;
    let (name, bytes) =
        file.ok_or_else(|| ApiError::Validation("missing file field".to_string()))?;

    let node = ctx
        .files
        .upload_document(std::path::Path::new(&folder_path), &name, &bytes)
        .await?;
    Ok(Json(node))
}

/// Store uploaded images in the pool. Per-file failures land in
/// `errFiles` rather than failing the whole request.
pub async fn upload_image(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> ApiResult<Json<serde_json::Value>> {
    let mut succ_map = serde_json::Map::new();
    let mut err_files: Vec<String> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_err)? {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field.bytes().await.map_err(multipart_err)?;
        match ctx.files.save_image(&name, &bytes).await {
            Ok(stored) => {
                succ_map.insert(name, image_url(&ctx, &stored).into());
            }
            Err(_) => err_files.push(name),
        }
    }

    // `code: 1` only when no file parts arrived at all; rejected files are
    // reported per-file through errFiles.
    let (msg, code) = if succ_map.is_empty() && err_files.is_empty() {
        ("no file uploaded", 1)
    } else {
        ("", 0)
    };
    Ok(Json(serde_json::json!({
        "msg": msg,
        "code": code,
        "data": { "errFiles": err_files, "succMap": succ_map },
    })))
}

#[derive(Deserialize)]
pub struct UploadImageFromUrlRequest {
    pub url: String,
}

pub async fn upload_image_from_url(
    State(ctx): State<AppContext>,
    Json(req): Json<UploadImageFromUrlRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let stored = ctx.files.fetch_image(&req.url).await?;
    Ok(Json(serde_json::json!({
        "msg": "",
        "code": 0,
        "data": {
            "originalURL": req.url,
            "url": image_url(&ctx, &stored),
        },
    })))
}

pub async fn get_image(
    State(ctx): State<AppContext>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    let path = ctx.files.image_path(&filename)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::from_io(e, &path))?;
    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}
