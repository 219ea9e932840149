//! # OpenAI互換チャットAPIによる検出
//!
//! `POST {endpoint}/chat/completions` に画像URLと指示文を送り、
//! `choices[0].message.content` のテキストを `parse_bounding_box` で解析する。

use std::time::Duration;

use imagelink_core::bbox::parse_bounding_box;
use imagelink_types::BoundingBox;
use serde::Deserialize;

use super::{DetectError, Detector};

/// システムメッセージ
const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// 検出指示。座標を空白区切りの4数値で返させ、見つからなければ全て0にさせる。
const DETECT_PROMPT: &str = "请使用相对于画面归一化的矩形坐标，描述一下图片中输液包装袋的位置和大小，\
如果找到，输出格式需要符合std::cin，依次输出左上角x - 空格 - 左上角y - 空格 - 右下角x - 空格 - 右下角y，\
如果没找到，则全给0";

/// エラーレスポンス本文をログに残す最大長
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: serde_json::Value,
}

/// OpenAI互換チャットAPIを使う検出器。
pub struct ChatCompletionsDetector {
    http_client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsDetector {
    /// 新しい検出器を作成する。
    ///
    /// # 引数
    /// - `endpoint`: APIのベースURL（末尾の `/chat/completions` は不要）
    /// - `timeout`: 1リクエストあたりのタイムアウト
    pub fn new(
        endpoint: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            url: format!("{}/chat/completions", endpoint.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn request_body(&self, image_url: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": [{"type": "text", "text": SYSTEM_PROMPT}],
                },
                {
                    "role": "user",
                    "content": [
                        {"type": "image_url", "image_url": {"url": image_url}},
                        {"type": "text", "text": DETECT_PROMPT},
                    ],
                },
            ],
        })
    }
}

/// メッセージ本文からテキストを取り出す。
///
/// 文字列、またはテキストパートの配列（`[{"type": "text", "text": ...}]`）に対応する。
fn message_text(content: &serde_json::Value) -> Option<String> {
    match content {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect();
            (!texts.is_empty()).then(|| texts.join(" "))
        }
        _ => None,
    }
}

#[async_trait::async_trait]
impl Detector for ChatCompletionsDetector {
    async fn detect(&self, image_url: &str) -> Result<BoundingBox, DetectError> {
        let response = self
            .http_client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(image_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DetectError::Status {
                status,
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| DetectError::Format(format!("JSONのパースに失敗: {e}")))?;
        let content = completion
            .choices
            .first()
            .ok_or_else(|| DetectError::Format("choicesが空です".to_string()))?;
        let text = message_text(&content.message.content)
            .ok_or_else(|| DetectError::Format("message.contentにテキストがありません".to_string()))?;

        let bbox = parse_bounding_box(text.trim());
        tracing::debug!(raw = %text.trim(), ?bbox, "検出結果");
        Ok(bbox)
    }
}
