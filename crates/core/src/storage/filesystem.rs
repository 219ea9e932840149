//! # ファイルシステム オブジェクトストレージ
//!
//! ローカルディレクトリにオブジェクトを1ファイルずつ保存する。
//!
//! 書き込みは `.{name}.{uuid}.part` の一時ファイルに行い、完了後に正規の名前へ
//! ハードリンクしてから一時ファイルを消す。リンクの作成は既存の名前に対して原子的に
//! 失敗するため、同名オブジェクトを上書きすることはない。
//! 途中で中断されたアップロードが正規のオブジェクトとして見えることはない。

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{validate_object_name, ObjectStorage, StorageError};

/// 一時ファイルの拡張子
const PARTIAL_SUFFIX: &str = ".part";

/// ローカルディレクトリに保存するオブジェクトストレージ。
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    /// ディレクトリを作成し、前回中断された一時ファイルを削除して開く。
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        let storage = Self { root };
        storage.purge_partials().await?;
        Ok(storage)
    }

    /// ルートディレクトリ
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_object_name(name)?;
        Ok(self.root.join(name))
    }

    async fn purge_partials(&self) -> Result<(), StorageError> {
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX) {
                tracing::debug!(file = %name, "中断された一時ファイルを削除");
                if let Err(e) = fs::remove_file(entry.path()).await {
                    tracing::warn!(file = %name, error = %e, "一時ファイルの削除に失敗");
                }
            }
        }
        Ok(())
    }

    async fn write_partial(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ObjectStorage for FilesystemStorage {
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.object_path(name)?;
        let partial = self.root.join(format!(
            ".{name}.{}{PARTIAL_SUFFIX}",
            uuid::Uuid::new_v4().simple()
        ));
        if let Err(e) = Self::write_partial(&partial, bytes).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }
        let linked = fs::hard_link(&partial, &path).await;
        if let Err(e) = fs::remove_file(&partial).await {
            tracing::warn!(file = %partial.display(), error = %e, "一時ファイルの削除に失敗");
        }
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(name)?;
        fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(name.to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let path = self.object_path(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            // 一時ファイルや非UTF-8名はオブジェクトとして扱わない
            if let Some(name) = entry.file_name().to_str() {
                if validate_object_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }
}
