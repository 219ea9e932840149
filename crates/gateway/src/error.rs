//! # Gateway エラー型
//!
//! 全エンドポイントで共通のエラー型。ステータスコードへの対応は `IntoResponse` で決める。

use axum::http::StatusCode;
use imagelink_core::AccessError;

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// APIキーが無い・一致しない
    #[error("Invalid API Key")]
    Unauthorized,
    /// 不正なリクエスト
    #[error("{0}")]
    BadRequest(String),
    /// リクエストボディが上限を超えた
    #[error("アップロードサイズが上限を超えています（上限: {0} bytes）")]
    PayloadTooLarge(usize),
    /// トークンが未登録
    #[error("Not Found")]
    NotFound,
    /// トークンの有効期限切れ
    #[error("Link expired")]
    Gone,
    /// ストレージ操作に失敗
    #[error("ストレージ操作に失敗: {0}")]
    Storage(String),
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl From<AccessError> for GatewayError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::Storage(_) => GatewayError::Storage(e.to_string()),
            AccessError::Exhausted(_) | AccessError::ExpiryOutOfRange(_) => {
                GatewayError::Internal(e.to_string())
            }
        }
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::Gone => StatusCode::GONE,
            GatewayError::Storage(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "リクエスト処理に失敗");
        }
        (status, self.to_string()).into_response()
    }
}
