use super::protocol::*;
use super::worker::Worker;

use axum::{Extension, Json, http::StatusCode};
use std::sync::Arc;

pub async fn handle_assign_task(
    Extension(worker): Extension<Arc<Worker>>,
    Json(req): Json<EngineRequest>,
) -> (StatusCode, Json<EngineResponse>) {
    // Execution continues in the background
    let (response, _execution) = worker.accept(req).await;
    (StatusCode::OK, Json(response))
}
