//! # Imagelink CLI
//!
//! Gatewayへの画像アップロードと一時URLの取得を行う運用・デバッグ用クライアント。
//!
//! ```text
//! imagelink-cli upload --server http://localhost:5000 --api-key KEY photo.png
//! imagelink-cli fetch http://localhost:5000/image/<token> --out photo.png
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use imagelink_types::UploadResponse;

#[derive(Parser)]
#[command(name = "imagelink-cli", version, about = "Imagelink CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 画像をアップロードし、一時URLと検出結果を表示する
    Upload {
        /// GatewayのベースURL
        #[arg(long, env = "IMAGELINK_SERVER", default_value = "http://localhost:5000")]
        server: String,
        /// X-API-KEY に送る共有キー
        #[arg(long, env = "IMAGELINK_API_KEY")]
        api_key: String,
        /// アップロードする画像ファイル
        file: PathBuf,
    },
    /// 一時URLから画像を取得する
    Fetch {
        /// `upload` が返したURL
        url: String,
        /// 保存先
        #[arg(long)]
        out: PathBuf,
    },
}

/// CLIのエラー型。
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// リンクが存在しない（404）
    #[error("リンクが存在しません")]
    NotFound,
    /// リンクの有効期限切れ（410）
    #[error("リンクの有効期限が切れています")]
    Expired,
    /// その他の非2xxレスポンス
    #[error("Gatewayがエラーを返しました: HTTP {status} - {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("HTTP通信に失敗: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ファイル操作に失敗 ({path}): {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// 画像をアップロードする。
async fn upload_image(
    client: &reqwest::Client,
    server: &str,
    api_key: &str,
    file: &Path,
) -> Result<UploadResponse, CliError> {
    let bytes = tokio::fs::read(file).await.map_err(|source| CliError::Io {
        path: file.to_path_buf(),
        source,
    })?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());

    let form = reqwest::multipart::Form::new().part(
        "image",
        reqwest::multipart::Part::bytes(bytes).file_name(file_name),
    );
    let response = client
        .post(format!("{}/upload", server.trim_end_matches('/')))
        .header("X-API-KEY", api_key)
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CliError::Status { status, body });
    }
    Ok(response.json().await?)
}

/// 一時URLから画像を取得して保存し、バイト数を返す。
async fn fetch_image(client: &reqwest::Client, url: &str, out: &Path) -> Result<usize, CliError> {
    let response = client.get(url).send().await?;
    match response.status() {
        reqwest::StatusCode::NOT_FOUND => return Err(CliError::NotFound),
        reqwest::StatusCode::GONE => return Err(CliError::Expired),
        status if !status.is_success() => {
            let body = response.text().await.unwrap_or_default();
            return Err(CliError::Status { status, body });
        }
        _ => {}
    }

    let bytes = response.bytes().await?;
    tokio::fs::write(out, &bytes)
        .await
        .map_err(|source| CliError::Io {
            path: out.to_path_buf(),
            source,
        })?;
    Ok(bytes.len())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Command::Upload {
            server,
            api_key,
            file,
        } => {
            let response = upload_image(&client, &server, &api_key, &file).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Fetch { url, out } => {
            let size = fetch_image(&client, &url, &out).await?;
            println!("{} ({size} bytes)", out.display());
        }
    }
    Ok(())
}
