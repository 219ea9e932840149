//! # エンドポイントテスト用共通ヘルパー
//!
//! 手動時計・一時ディレクトリ上のストレージ・モック検出器で組み立てたGatewayを起動する。

use std::sync::Arc;

use chrono::TimeDelta;
use imagelink_core::{AccessGateway, FilesystemStorage, LinkRegistry, ManualClock, ObjectStorage};
use imagelink_types::BoundingBox;

use crate::config::GatewayState;
use crate::detect::{DetectError, Detector};

pub const TEST_API_KEY: &str = "test-api-key";

/// テスト用のアップロード上限（小さくして413を確認しやすくする）
pub const TEST_MAX_UPLOAD_BYTES: usize = 4096;

/// 常に同じ結果を返す検出器
pub struct FixedDetector(pub BoundingBox);

#[async_trait::async_trait]
impl Detector for FixedDetector {
    async fn detect(&self, _image_url: &str) -> Result<BoundingBox, DetectError> {
        Ok(self.0)
    }
}

/// 常に失敗する検出器
pub struct FailingDetector;

#[async_trait::async_trait]
impl Detector for FailingDetector {
    async fn detect(&self, _image_url: &str) -> Result<BoundingBox, DetectError> {
        Err(DetectError::Format("mock failure".to_string()))
    }
}

/// テスト用Gatewayの一式
pub struct Harness {
    pub state: Arc<GatewayState>,
    pub clock: Arc<ManualClock>,
    pub storage: Arc<FilesystemStorage>,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub async fn storage_is_empty(&self) -> bool {
        self.storage.list().await.unwrap().is_empty()
    }
}

/// テスト用GatewayStateを構築するヘルパー
pub async fn test_state(detector: Box<dyn Detector>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FilesystemStorage::open(dir.path()).await.unwrap());
    let clock = Arc::new(ManualClock::default());
    let access = AccessGateway::new(
        Arc::new(LinkRegistry::in_memory()),
        storage.clone(),
        TimeDelta::minutes(15),
    )
    .with_clock(clock.clone());

    let state = Arc::new(GatewayState {
        api_key: TEST_API_KEY.to_string(),
        access,
        detector,
        public_base_url: None,
        max_upload_bytes: TEST_MAX_UPLOAD_BYTES,
    });
    Harness {
        state,
        clock,
        storage,
        _dir: dir,
    }
}

/// ルーターを 127.0.0.1 の空きポートで起動し、ベースURLを返す。
pub async fn start_gateway(state: Arc<GatewayState>) -> String {
    let app = super::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    format!("http://127.0.0.1:{port}")
}
