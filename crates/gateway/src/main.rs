//! # Imagelink Gateway
//!
//! アップロード画像を推測不能なトークンで一時公開し、画像認識サービスで
//! 対象物の位置を求めるHTTPサーバー。
//!
//! ## API エンドポイント
//! - `POST /upload`: 画像アップロード（`X-API-KEY` 必須）。`{url, expires_at, bbox}` を返す
//! - `GET /image/{token}`: 有効期限内の画像を返す。未登録は404、期限切れは410
//! - `GET /healthz`: 稼働確認
//!
//! ## 起動シーケンス
//! 1. 設定読み込み（環境変数）
//! 2. ストレージを開き、スナップショットからレジストリを復元
//! 3. 孤立オブジェクトの削除（リクエスト受付前）
//! 4. Reaper起動
//! 5. HTTPサーバー起動（Ctrl-Cでグレースフルシャットダウン）

mod auth;
mod config;
mod detect;
mod endpoints;
mod error;

use std::sync::Arc;

use imagelink_core::{AccessGateway, FilesystemStorage, JsonFileStore, LinkRegistry};
use tracing_subscriber::EnvFilter;

use crate::config::{GatewayConfig, GatewayState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::from_env()?;

    let storage = Arc::new(FilesystemStorage::open(&config.upload_dir).await?);
    tracing::info!(dir = %config.upload_dir.display(), "ストレージを開きました");

    let registry = Arc::new(
        LinkRegistry::load(Box::new(JsonFileStore::new(&config.links_file))).await,
    );
    let access = AccessGateway::new(registry, storage, config.link_ttl);

    let reaper = access.reaper(config.sweep_interval);
    if let Err(e) = reaper.reclaim_orphans().await {
        tracing::warn!(error = %e, "孤立オブジェクトの走査に失敗");
    }
    // プロセス終了時にランタイムごと破棄される
    let _reaper = reaper.spawn();

    let detector = detect::from_config(&config.vision)?;

    let state = Arc::new(GatewayState {
        api_key: config.api_key.clone(),
        access,
        detector,
        public_base_url: config.public_base_url.clone(),
        max_upload_bytes: config.max_upload_bytes,
    });

    let app = endpoints::router(state);

    tracing::info!(
        ttl_secs = config.link_ttl.num_seconds(),
        sweep_interval_secs = config.sweep_interval.as_secs(),
        "Gatewayを {} で起動します",
        config.bind_addr
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gatewayを停止しました");
    Ok(())
}

/// Ctrl-Cを待つ。
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "シグナルハンドラの登録に失敗");
        std::future::pending::<()>().await;
    }
    tracing::info!("シャットダウンを開始します");
}
