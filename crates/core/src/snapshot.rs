//! # スナップショットストア
//!
//! レジストリ全体をJSONファイルに保存し、プロセス再起動後に復元する。
//!
//! ## ファイル形式
//! ```text
//! {
//!   "<token>": { "filename": "<object name>", "expires": "<ISO 8601>" },
//!   ...
//! }
//! ```
//! 変更のたびに全体を書き直す。書き込みは一時ファイル経由のリネームで行い、
//! 書き込み途中のファイルが読まれることはない。

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use imagelink_types::PersistedLink;
use tokio::fs;

/// 永続化されるレジストリの全体（トークン文字列 → リンク）。
pub type PersistedLinks = BTreeMap<String, PersistedLink>;

/// スナップショット操作のエラー型。
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// I/Oエラー
    #[error("スナップショットのI/Oに失敗: {0}")]
    Io(#[from] std::io::Error),
    /// JSONの形式不正
    #[error("スナップショットの形式が不正: {0}")]
    Format(#[from] serde_json::Error),
}

/// レジストリの永続化先。
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// 保存済みの状態を読み込む。保存先が存在しなければ空を返す。
    async fn load(&self) -> Result<PersistedLinks, SnapshotError>;

    /// 現在の状態全体で上書きする。
    async fn persist(&self, links: &PersistedLinks) -> Result<(), SnapshotError>;
}

/// 単一のJSONファイルによるスナップショットストア。
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut tmp = OsString::from(self.path.as_os_str());
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

#[async_trait::async_trait]
impl SnapshotStore for JsonFileStore {
    async fn load(&self) -> Result<PersistedLinks, SnapshotError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PersistedLinks::new());
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(PersistedLinks::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn persist(&self, links: &PersistedLinks) -> Result<(), SnapshotError> {
        let bytes = serde_json::to_vec_pretty(links)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.temp_path();
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
