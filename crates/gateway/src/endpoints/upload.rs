//! # POST /upload
//!
//! multipartの `image` フィールドで画像を受け取り、一時URLを発行したうえで
//! 画像認識サービスに対象物の位置を問い合わせる。
//!
//! 検出に失敗しても画像の公開は成功しているため、`bbox` を `(0, 0, 0, 0)` にして200を返す。

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use imagelink_types::{BoundingBox, UploadResponse};

use crate::auth::require_api_key;
use crate::config::GatewayState;
use crate::error::GatewayError;

/// 画像を運ぶmultipartフィールド名
pub const IMAGE_FIELD: &str = "image";

/// アップロードされた画像
struct UploadedImage {
    file_name: String,
    bytes: Vec<u8>,
}

/// multipartボディから `image` フィールドを取り出す。
async fn read_image_field(
    multipart: &mut Multipart,
    limit: usize,
) -> Result<UploadedImage, GatewayError> {
    let multipart_error = |e: axum::extract::multipart::MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            GatewayError::PayloadTooLarge(limit)
        } else {
            GatewayError::BadRequest(format!("multipartの読み取りに失敗: {e}"))
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(GatewayError::BadRequest("No selected file".to_string()));
        }
        let bytes = field.bytes().await.map_err(multipart_error)?;
        return Ok(UploadedImage {
            file_name,
            bytes: bytes.to_vec(),
        });
    }
    Err(GatewayError::BadRequest("No image part".to_string()))
}

/// 公開URLのベースを決める。
///
/// 設定が無ければ `X-Forwarded-Proto` と `Host` ヘッダから組み立てる。
fn base_url(state: &GatewayState, headers: &HeaderMap) -> Result<String, GatewayError> {
    if let Some(base) = &state.public_base_url {
        return Ok(base.clone());
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| GatewayError::BadRequest("Hostヘッダがありません".to_string()))?;
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .filter(|s| matches!(*s, "http" | "https"))
        .unwrap_or("http");
    Ok(format!("{scheme}://{host}"))
}

/// POST /upload: 画像アップロード。
pub async fn handle_upload(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, GatewayError> {
    require_api_key(&headers, &state.api_key)?;

    let image = read_image_field(&mut multipart, state.max_upload_bytes).await?;
    if image.bytes.is_empty() {
        return Err(GatewayError::BadRequest("Empty image".to_string()));
    }
    let base = base_url(&state, &headers)?;

    let link = state.access.publish(&image.bytes, &image.file_name).await?;
    let url = format!("{base}/image/{}", link.token);

    let bbox = match state.detector.detect(&url).await {
        Ok(bbox) => bbox,
        Err(e) => {
            tracing::warn!(token = %link.token, error = %e, "対象物の検出に失敗。(0, 0, 0, 0) を返します");
            BoundingBox::NOT_FOUND
        }
    };

    Ok(Json(UploadResponse {
        url,
        expires_at: link.expires_at,
        bbox,
    }))
}
