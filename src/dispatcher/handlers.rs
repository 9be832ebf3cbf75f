use super::engine::DispatchEngine;
use super::protocol::*;
use crate::manager::protocol::{HEADER_REFERER, header_value};

use axum::{Extension, Json, http::HeaderMap, http::StatusCode};
use std::sync::Arc;

pub async fn handle_submit_flow(
    Extension(dispatcher): Extension<Arc<DispatchEngine>>,
    headers: HeaderMap,
    Json(req): Json<SubmitFlowRequest>,
) -> Result<Json<SubmitFlowResponse>, (StatusCode, String)> {
    let referer = header_value(&headers, HEADER_REFERER);

    match dispatcher.receive_flow(req, referer).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            tracing::warn!("Rejected flow submission: {}", e);
            Err((StatusCode::BAD_REQUEST, e.to_string()))
        }
    }
}
