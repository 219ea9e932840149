//! # 画像認識（バウンディングボックス検出）
//!
//! 公開URLの画像から対象物の位置を正規化座標で求める外部サービスを抽象化する。
//!
//! ## 実装
//! - `ChatCompletionsDetector`: OpenAI互換のチャットAPI（Qwen-VL等）
//! - `DisabledDetector`: APIキー未設定時。常に番兵値を返す
//!
//! 検出の失敗はアップロード全体の失敗にしない。呼び出し側で番兵値に落とす。

pub mod chat;

pub use chat::ChatCompletionsDetector;

use imagelink_types::BoundingBox;

use crate::config::VisionConfig;

/// 検出処理のエラー型。
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// HTTP送受信に失敗（タイムアウトを含む）
    #[error("画像認識サービスとの通信に失敗: {0}")]
    Http(#[from] reqwest::Error),
    /// 非2xxレスポンス
    #[error("画像認識サービスがエラーを返しました: HTTP {status} - {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    /// レスポンスの構造が想定外
    #[error("画像認識サービスのレスポンスが不正: {0}")]
    Format(String),
}

/// バウンディングボックス検出のトレイト。
#[async_trait::async_trait]
pub trait Detector: Send + Sync {
    /// `image_url` の画像から対象物を探す。見つからなければ `BoundingBox::NOT_FOUND`。
    async fn detect(&self, image_url: &str) -> Result<BoundingBox, DetectError>;
}

/// 検出を行わない実装。
pub struct DisabledDetector;

#[async_trait::async_trait]
impl Detector for DisabledDetector {
    async fn detect(&self, _image_url: &str) -> Result<BoundingBox, DetectError> {
        Ok(BoundingBox::NOT_FOUND)
    }
}

/// 設定から検出器を構築する。APIキーが無ければ `DisabledDetector`。
pub fn from_config(config: &VisionConfig) -> Result<Box<dyn Detector>, reqwest::Error> {
    match &config.api_key {
        Some(api_key) => {
            tracing::info!(
                endpoint = %config.endpoint,
                model = %config.model,
                "画像認識サービスを設定"
            );
            Ok(Box::new(ChatCompletionsDetector::new(
                &config.endpoint,
                api_key,
                &config.model,
                config.timeout,
            )?))
        }
        None => {
            tracing::warn!("VISION_API_KEYが未設定です。検出結果は常に (0, 0, 0, 0) になります");
            Ok(Box::new(DisabledDetector))
        }
    }
}
