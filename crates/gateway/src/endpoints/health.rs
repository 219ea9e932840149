//! # GET /healthz

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use imagelink_types::HealthResponse;

use crate::config::GatewayState;

/// GET /healthz: 稼働確認。現在のリンク数を返す。
pub async fn handle_health(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        links: state.access.registry().len().await,
    })
}
