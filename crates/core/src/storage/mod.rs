//! # オブジェクトストレージ
//!
//! アップロードされた画像バイト列の保存先を抽象化する。
//! ファイルシステム実装は `filesystem` サブモジュールを参照。
//!
//! オブジェクト名はサーバー側で生成したもののみを扱い、
//! ユーザーが指定したファイル名がパスとして使われることはない。

pub mod filesystem;

pub use filesystem::FilesystemStorage;

/// ストレージ操作のエラー型。
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// オブジェクトが存在しない
    #[error("オブジェクトが存在しません: {0}")]
    NotFound(String),
    /// 同名のオブジェクトが既に存在する
    #[error("オブジェクトが既に存在します: {0}")]
    AlreadyExists(String),
    /// オブジェクト名が不正（パストラバーサル等）
    #[error("不正なオブジェクト名: {0}")]
    InvalidName(String),
    /// I/Oエラー
    #[error("ストレージI/Oエラー: {0}")]
    Io(#[from] std::io::Error),
}

/// オブジェクトストレージの抽象インターフェース。
#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    /// オブジェクトを書き込む。
    ///
    /// 書き込みが完了するまでオブジェクトは見えない。同名が既にあれば `AlreadyExists`。
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// オブジェクトを読み出す。存在しなければ `NotFound`。
    async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    /// オブジェクトを削除する。
    ///
    /// 冪等。削除した場合 `true`、既に無かった場合 `false`。
    async fn delete(&self, name: &str) -> Result<bool, StorageError>;

    /// 保存されている全オブジェクト名を返す（順不同）。
    async fn list(&self) -> Result<Vec<String>, StorageError>;
}

/// オブジェクト名の最大長
pub const MAX_OBJECT_NAME_LEN: usize = 128;

/// オブジェクト名を検証する。
///
/// 英数字と `.` `_` `-` のみ、先頭は `.` 以外、`..` を含まないこと。
pub fn validate_object_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_OBJECT_NAME_LEN
        && !name.starts_with('.')
        && !name.contains("..")
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}
