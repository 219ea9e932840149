//! # GET /image/{token}
//!
//! 有効なトークンなら画像を返す。未登録は404、期限切れは410
//! （このとき画像とリンクは削除される）。

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use imagelink_core::{Clock, ResolveOutcome};

use crate::config::GatewayState;
use crate::error::GatewayError;

/// 拡張子から判別できない場合のContent-Type
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// オブジェクト名の拡張子からContent-Typeを決める。
pub fn content_type_for(object_name: &str) -> &'static str {
    ::image::ImageFormat::from_path(object_name)
        .map(|format| format.to_mime_type())
        .unwrap_or(FALLBACK_CONTENT_TYPE)
}

/// GET /image/{token}: 一時URLの画像取得。
pub async fn handle_image(
    State(state): State<Arc<GatewayState>>,
    Path(token): Path<String>,
) -> Result<Response, GatewayError> {
    match state.access.resolve(&token).await? {
        ResolveOutcome::Found(image) => {
            // 期限を過ぎてキャッシュから返されないようにする
            let max_age = (image.expires_at - state.access.clock().now()).num_seconds().max(0);
            Ok((
                [
                    (header::CONTENT_TYPE, content_type_for(&image.object_name).to_string()),
                    (header::CACHE_CONTROL, format!("private, max-age={max_age}")),
                ],
                image.bytes,
            )
                .into_response())
        }
        ResolveOutcome::NotFound => Err(GatewayError::NotFound),
        ResolveOutcome::Expired => Err(GatewayError::Gone),
    }
}
