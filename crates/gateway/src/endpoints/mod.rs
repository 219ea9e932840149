//! # Gatewayエンドポイント
//!
//! - `POST /upload`: 画像アップロード + 一時URL発行 + 対象物検出
//! - `GET /image/{token}`: 一時URLの画像取得
//! - `GET /healthz`: 稼働確認

pub mod health;
pub mod image;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use health::handle_health;
pub use image::handle_image;
pub use upload::handle_upload;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;

use crate::config::GatewayState;

/// 全エンドポイントを束ねたルーターを構築する。
pub fn router(state: Arc<GatewayState>) -> axum::Router {
    let body_limit = state.max_upload_bytes;
    axum::Router::new()
        .route("/upload", axum::routing::post(handle_upload))
        .route("/image/{token}", axum::routing::get(handle_image))
        .route("/healthz", axum::routing::get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
