use super::protocol::*;
use super::service::ResultAggregator;
use crate::graph::types::FlowId;

use axum::{Extension, Json, extract::Path, http::StatusCode};
use std::sync::Arc;

pub async fn handle_poll_result(
    Extension(aggregator): Extension<Arc<ResultAggregator>>,
    Path(flow_id): Path<String>,
) -> (StatusCode, Json<ResultPollResponse>) {
    let response = aggregator.poll(&FlowId(flow_id)).await;
    (StatusCode::OK, Json(response))
}

pub async fn handle_submit_result(
    Extension(aggregator): Extension<Arc<ResultAggregator>>,
    Path(flow_id): Path<String>,
    Json(req): Json<ResultSubmission>,
) -> (StatusCode, Json<ResultAck>) {
    let flow_id = FlowId(flow_id);
    tracing::debug!("Result for task {} of flow {}", req.task_id, flow_id);

    let accepted = aggregator.apply(&flow_id, req).await;
    (StatusCode::OK, Json(ResultAck { accepted }))
}

pub async fn handle_delete_flow(
    Extension(aggregator): Extension<Arc<ResultAggregator>>,
    Path(flow_id): Path<String>,
) -> (StatusCode, Json<DeleteFlowResponse>) {
    let response = aggregator.delete(&FlowId(flow_id)).await;
    (StatusCode::OK, Json(response))
}
