//! # APIキー認証
//!
//! アップロードは `X-API-KEY` ヘッダの値が共有キーと一致する場合のみ受け付ける。
//! 比較は両者のSHA-256ダイジェストに対して行い、一致位置による処理時間の差を出さない。

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::error::GatewayError;

/// APIキーを運ぶヘッダ名
pub const API_KEY_HEADER: &str = "x-api-key";

/// リクエストヘッダのAPIキーを検証する。
pub(crate) fn require_api_key(headers: &HeaderMap, expected: &str) -> Result<(), GatewayError> {
    let provided = headers
        .get(API_KEY_HEADER)
        .ok_or(GatewayError::Unauthorized)?
        .as_bytes();

    if keys_match(provided, expected.as_bytes()) {
        Ok(())
    } else {
        tracing::debug!("APIキーが一致しません");
        Err(GatewayError::Unauthorized)
    }
}

fn keys_match(provided: &[u8], expected: &[u8]) -> bool {
    let a = Sha256::digest(provided);
    let b = Sha256::digest(expected);
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
