//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//!
//! | 変数 | 既定値 |
//! |---|---|
//! | `API_KEY` | 必須 |
//! | `BIND_ADDR` | `0.0.0.0:5000` |
//! | `UPLOAD_DIR` | `uploaded` |
//! | `LINKS_FILE` | `temp_links.json` |
//! | `LINK_TTL_SECS` | `900`（上限365日） |
//! | `SWEEP_INTERVAL_SECS` | `60` |
//! | `PUBLIC_BASE_URL` | 未設定（Hostヘッダから組み立て） |
//! | `MAX_UPLOAD_BYTES` | `20971520` |
//! | `VISION_ENDPOINT` | DashScope互換モード |
//! | `VISION_API_KEY` / `DASHSCOPE_API_KEY` | 未設定（検出を無効化） |
//! | `VISION_MODEL` | `qwen-vl-max-latest` |
//! | `VISION_TIMEOUT_SECS` | `30` |

use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use imagelink_core::AccessGateway;

use crate::detect::Detector;

/// 画像認識サービスの既定エンドポイント（OpenAI互換API）
pub const DEFAULT_VISION_ENDPOINT: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// 画像認識モデルの既定値
pub const DEFAULT_VISION_MODEL: &str = "qwen-vl-max-latest";

/// リンク有効期間の上限（365日）
pub const MAX_LINK_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// 設定読み込みのエラー型。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 必須の環境変数が無い
    #[error("環境変数 {0} が設定されていません")]
    Missing(&'static str),
    /// 値が解釈できない
    #[error("環境変数 {key} の値が不正です: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// 画像認識サービスの接続設定。
#[derive(Debug, Clone)]
pub struct VisionConfig {
    /// OpenAI互換APIのベースURL（`/chat/completions` を付けて呼ぶ）
    pub endpoint: String,
    /// APIキー。`None` なら検出を行わず常に番兵値を返す。
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

/// Gatewayの起動設定。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// `X-API-KEY` ヘッダと照合する共有キー
    pub api_key: String,
    pub bind_addr: String,
    /// 画像の保存ディレクトリ
    pub upload_dir: PathBuf,
    /// リンク対応表のスナップショットファイル
    pub links_file: PathBuf,
    /// リンクの有効期間
    pub link_ttl: TimeDelta,
    /// Reaperの実行間隔
    pub sweep_interval: Duration,
    /// 公開URLのベース（例: `https://img.example.com`）
    pub public_base_url: Option<String>,
    /// アップロードボディの上限
    pub max_upload_bytes: usize,
    pub vision: VisionConfig,
}

impl GatewayConfig {
    /// 環境変数から構築する。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// キー → 値の参照関数から構築する。空文字列は未設定として扱う。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("API_KEY").ok_or(ConfigError::Missing("API_KEY"))?;
        let link_ttl_secs = parse_positive(&get, "LINK_TTL_SECS", 15 * 60)?;
        let link_ttl = Some(link_ttl_secs)
            .filter(|&secs| secs <= MAX_LINK_TTL_SECS)
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| ConfigError::Invalid {
                key: "LINK_TTL_SECS",
                value: link_ttl_secs.to_string(),
            })?;
        let sweep_interval =
            Duration::from_secs(parse_positive(&get, "SWEEP_INTERVAL_SECS", 60)?);
        let max_upload_bytes = usize::try_from(parse_positive(
            &get,
            "MAX_UPLOAD_BYTES",
            20 * 1024 * 1024,
        )?)
        .map_err(|_| ConfigError::Invalid {
            key: "MAX_UPLOAD_BYTES",
            value: get("MAX_UPLOAD_BYTES").unwrap_or_default(),
        })?;

        let vision = VisionConfig {
            endpoint: get("VISION_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_VISION_ENDPOINT.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: get("VISION_API_KEY").or_else(|| get("DASHSCOPE_API_KEY")),
            model: get("VISION_MODEL").unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            timeout: Duration::from_secs(parse_positive(&get, "VISION_TIMEOUT_SECS", 30)?),
        };

        Ok(Self {
            api_key,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:5000".to_string()),
            upload_dir: get("UPLOAD_DIR")
                .unwrap_or_else(|| "uploaded".to_string())
                .into(),
            links_file: get("LINKS_FILE")
                .unwrap_or_else(|| "temp_links.json".to_string())
                .into(),
            link_ttl,
            sweep_interval,
            public_base_url: get("PUBLIC_BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
            max_upload_bytes,
            vision,
        })
    }
}

/// 1以上の整数値を読む。未設定なら `default`。
fn parse_positive(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ConfigError::Invalid { key, value: raw }),
    }
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// `X-API-KEY` と照合する共有キー
    pub api_key: String,
    /// リンクの発行・解決
    pub access: AccessGateway,
    /// 画像認識サービス（トレイトで抽象化）
    pub detector: Box<dyn Detector>,
    /// 公開URLのベース。`None` ならリクエストのHostヘッダから組み立てる。
    pub public_base_url: Option<String>,
    /// アップロードボディの上限（バイト）
    pub max_upload_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[("API_KEY", "secret")])).unwrap();
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.upload_dir, PathBuf::from("uploaded"));
        assert_eq!(config.links_file, PathBuf::from("temp_links.json"));
        assert_eq!(config.link_ttl, TimeDelta::minutes(15));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.public_base_url, None);
        assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(config.vision.endpoint, DEFAULT_VISION_ENDPOINT);
        assert_eq!(config.vision.api_key, None);
        assert_eq!(config.vision.model, DEFAULT_VISION_MODEL);
        assert_eq!(config.vision.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("API_KEY", "secret"),
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("UPLOAD_DIR", "/var/lib/imagelink/objects"),
            ("LINKS_FILE", "/var/lib/imagelink/links.json"),
            ("LINK_TTL_SECS", "120"),
            ("SWEEP_INTERVAL_SECS", "5"),
            ("PUBLIC_BASE_URL", "https://img.example.com/"),
            ("MAX_UPLOAD_BYTES", "1024"),
            ("VISION_ENDPOINT", "http://localhost:9000/v1/"),
            ("DASHSCOPE_API_KEY", "dash-key"),
            ("VISION_MODEL", "qwen-vl-plus"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.link_ttl, TimeDelta::seconds(120));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(
            config.public_base_url.as_deref(),
            Some("https://img.example.com")
        );
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.vision.endpoint, "http://localhost:9000/v1");
        assert_eq!(config.vision.api_key.as_deref(), Some("dash-key"));
        assert_eq!(config.vision.model, "qwen-vl-plus");
    }

    #[test]
    fn test_vision_api_key_takes_precedence() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("API_KEY", "secret"),
            ("VISION_API_KEY", "vision-key"),
            ("DASHSCOPE_API_KEY", "dash-key"),
        ]))
        .unwrap();
        assert_eq!(config.vision.api_key.as_deref(), Some("vision-key"));
    }

    #[test]
    fn test_missing_api_key() {
        assert!(matches!(
            GatewayConfig::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("API_KEY"))
        ));
        assert!(matches!(
            GatewayConfig::from_lookup(lookup(&[("API_KEY", "  ")])),
            Err(ConfigError::Missing("API_KEY"))
        ));
    }

    #[test]
    fn test_link_ttl_upper_bound() {
        let max = MAX_LINK_TTL_SECS.to_string();
        let config = GatewayConfig::from_lookup(lookup(&[
            ("API_KEY", "secret"),
            ("LINK_TTL_SECS", max.as_str()),
        ]))
        .unwrap();
        assert_eq!(config.link_ttl, TimeDelta::days(365));

        let over = (MAX_LINK_TTL_SECS + 1).to_string();
        assert!(matches!(
            GatewayConfig::from_lookup(lookup(&[
                ("API_KEY", "secret"),
                ("LINK_TTL_SECS", over.as_str()),
            ])),
            Err(ConfigError::Invalid { key: "LINK_TTL_SECS", .. })
        ));
    }

    #[test]
    fn test_invalid_numbers() {
        for (key, value) in [
            ("LINK_TTL_SECS", "0"),
            ("LINK_TTL_SECS", "fifteen"),
            ("LINK_TTL_SECS", "9000000000000"),
            ("SWEEP_INTERVAL_SECS", "-1"),
            ("MAX_UPLOAD_BYTES", "1.5"),
            ("VISION_TIMEOUT_SECS", "0"),
        ] {
            let result = GatewayConfig::from_lookup(lookup(&[("API_KEY", "secret"), (key, value)]));
            assert!(
                matches!(result, Err(ConfigError::Invalid { key: k, .. }) if k == key),
                "{key}={value} は不正値として拒否されるべき"
            );
        }
    }
}
