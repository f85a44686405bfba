pub mod files;
pub mod sessions;
pub mod uploads;

use axum::extract::State;
use axum::Json;

use crate::AppContext;

pub async fn health(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": ctx.started_at.elapsed().as_secs(),
    }))
}
