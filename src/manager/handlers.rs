use super::failover::FailoverProtocol;
use super::protocol::*;

use axum::{Extension, Json, extract::Path, http::HeaderMap, http::StatusCode};
use std::sync::Arc;

pub async fn handle_probe(
    Extension(failover): Extension<Arc<FailoverProtocol>>,
    Path(is_candidate): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<ManagerSnapshot>) {
    let referer = header_value(&headers, HEADER_REFERER);
    let default_score = header_value(&headers, HEADER_SCORE).unwrap_or(0.0);
    let on_battery = header_value(&headers, HEADER_DEFAULT_BATTERY).unwrap_or(false);
    let is_candidate = is_candidate.eq_ignore_ascii_case("true");

    let snapshot = failover
        .register_peer(referer, is_candidate, default_score, on_battery)
        .await;
    (StatusCode::OK, Json(snapshot))
}

pub async fn handle_heartbeat(
    Extension(failover): Extension<Arc<FailoverProtocol>>,
    headers: HeaderMap,
    Json(req): Json<ManagerSnapshot>,
) -> (StatusCode, Json<HeartbeatReply>) {
    let referer = header_value(&headers, HEADER_REFERER);
    let reply = failover.receive_push(referer, req).await;
    (StatusCode::OK, Json(reply))
}
