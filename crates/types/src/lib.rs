//! # Imagelink 共有型定義
//!
//! Gateway・Core・CLIで共有するHTTPレスポンスと永続化フォーマットの構造体。
//!
//! ## エンコーディング規則
//! - 時刻: ISO 8601 (RFC 3339, UTC)
//! - バウンディングボックス: `[x0, y0, x1, y1]` のJSON配列（画面サイズで正規化）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// バウンディングボックス
// ---------------------------------------------------------------------------

/// 正規化座標によるバウンディングボックス。
///
/// 左上 `(x0, y0)` と右下 `(x1, y1)` の4値。全て0は「対象なし」を表す。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox(pub [f64; 4]);

impl BoundingBox {
    /// 対象が見つからなかったことを表す番兵値 `(0, 0, 0, 0)`。
    pub const NOT_FOUND: BoundingBox = BoundingBox([0.0; 4]);

    /// 4つの座標から構築する。
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self([x0, y0, x1, y1])
    }

    /// 番兵値（全て0）かどうか。
    pub fn is_not_found(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    /// 左上座標
    pub fn top_left(&self) -> (f64, f64) {
        (self.0[0], self.0[1])
    }

    /// 右下座標
    pub fn bottom_right(&self) -> (f64, f64) {
        (self.0[2], self.0[3])
    }
}

// ---------------------------------------------------------------------------
// HTTP API
// ---------------------------------------------------------------------------

/// POST /upload のレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// 画像を取得できる一時URL（`{base}/image/{token}`）
    pub url: String,
    /// リンクの有効期限
    pub expires_at: DateTime<Utc>,
    /// 検出結果
    pub bbox: BoundingBox,
}

/// GET /healthz のレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 常に "ok"
    pub status: String,
    /// 現在レジストリに登録されているリンク数
    pub links: usize,
}

// ---------------------------------------------------------------------------
// 永続化フォーマット
// ---------------------------------------------------------------------------

/// スナップショットファイルに保存されるリンク1件。
///
/// ファイル全体は `{ "<token>": { "filename": ..., "expires": ... } }` の形。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedLink {
    /// ストレージ上のオブジェクト名（アップロード時のファイル名とは無関係）
    pub filename: String,
    /// 有効期限
    pub expires: DateTime<Utc>,
}
