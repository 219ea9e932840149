//! # アクセスゲートウェイ
//!
//! リクエスト側の操作 `publish` / `resolve` と、リンク削除の単位操作。
//!
//! ## publish
//! 1. ユーザー指定名とは無関係なオブジェクト名を生成する（拡張子のみ引き継ぐ）
//! 2. ストレージに書き込む（失敗したらここで中断し、レジストリには何も残らない）
//! 3. トークンを生成しレジストリに登録する（衝突したら引き直す）
//!
//! ## resolve
//! レジストリを引き、期限切れならその場で削除して `Expired` を返す。
//! Reaperの実行を待たずに期限切れを検出するため、期限切れの画像を返すことはない。

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use crate::clock::{Clock, SystemClock};
use crate::reaper::Reaper;
use crate::registry::{LinkEntry, LinkRegistry, RegistryError};
use crate::storage::{ObjectStorage, StorageError};
use crate::token::{LinkToken, RandomTokens, TokenSource};

/// トークン衝突時の再試行上限
pub const MAX_TOKEN_ATTEMPTS: usize = 8;

/// オブジェクト名衝突時の再試行上限
pub const MAX_OBJECT_NAME_ATTEMPTS: usize = 4;

/// 引き継ぐ拡張子の最大長（`.` を除く）
const MAX_EXTENSION_LEN: usize = 10;

/// アクセスゲートウェイのエラー型。
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// ストレージの読み書きに失敗
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// 衝突しないトークン（またはオブジェクト名）を確保できなかった
    #[error("一意な識別子を確保できませんでした（{0}回試行）")]
    Exhausted(usize),
    /// 有効期限が表現可能な日時の範囲を超える
    #[error("有効期限を計算できません（TTL: {0}秒）")]
    ExpiryOutOfRange(i64),
}

/// 公開されたリンク。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedLink {
    pub token: LinkToken,
    pub object_name: String,
    pub expires_at: DateTime<Utc>,
}

/// 有効なリンクが指す画像。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// ストレージ上のオブジェクト名（拡張子からContent-Typeを決める）
    pub object_name: String,
    pub bytes: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

/// `resolve` の結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// 有効期限内
    Found(StoredImage),
    /// 未登録（または既に削除済み）
    NotFound,
    /// 期限切れ。このリンクに対して一度だけ返り、以降は `NotFound`。
    ///
    /// ただしオブジェクトの削除に失敗してエントリが残った場合は、
    /// 削除に成功するまで（次の `resolve` かReaperの掃除で）`Expired` を返し続ける。
    Expired,
}

/// リンク削除の単位操作の結果。
#[derive(Debug)]
pub(crate) enum Removal {
    /// この呼び出しがエントリを削除した
    Removed,
    /// 並行する別の呼び出しが先に削除していた
    AlreadyGone,
    /// オブジェクトを削除できなかったため、エントリを残した（次回の掃除で再試行）
    Retained(StorageError),
}

/// オブジェクトとレジストリエントリを対で削除する。
///
/// オブジェクトが既に無い場合もエントリの削除は進める。
/// オブジェクトの削除がI/Oエラーで失敗した場合はエントリを残し、ストレージを取り残さない。
pub(crate) async fn remove_link(
    registry: &LinkRegistry,
    storage: &dyn ObjectStorage,
    entry: &LinkEntry,
) -> Removal {
    match storage.delete(&entry.object_name).await {
        Ok(_) | Err(StorageError::NotFound(_)) => {}
        Err(e) => return Removal::Retained(e),
    }
    match registry.delete(&entry.token).await {
        Ok(_) => Removal::Removed,
        Err(RegistryError::NotFound(_)) | Err(RegistryError::Collision(_)) => {
            Removal::AlreadyGone
        }
    }
}

/// ユーザー指定のファイル名から拡張子だけを取り出す。
///
/// 英数字以外を含む・長すぎる拡張子は捨てる。返り値は `.png` のような小文字。
pub fn sanitize_extension(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    match base.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.bytes().all(|b| b.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => String::new(),
    }
}

/// `publish` が生成し得るオブジェクト名かどうか。
///
/// 32桁の小文字16進数に、任意で `sanitize_extension` 形式の拡張子が付いたもの。
/// 孤立オブジェクトの回収はこの形の名前だけを対象にする。
pub fn is_managed_object_name(name: &str) -> bool {
    let (stem, extension) = match name.split_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (name, None),
    };
    let stem_ok = stem.len() == 32
        && stem
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    let extension_ok = extension.map_or(true, |ext| {
        !ext.is_empty()
            && ext.len() <= MAX_EXTENSION_LEN
            && ext
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
    });
    stem_ok && extension_ok
}

/// `publish` / `resolve` を提供するリクエスト側の窓口。
pub struct AccessGateway {
    registry: Arc<LinkRegistry>,
    storage: Arc<dyn ObjectStorage>,
    clock: Arc<dyn Clock>,
    tokens: Arc<dyn TokenSource>,
    ttl: TimeDelta,
}

impl AccessGateway {
    /// システム時計と乱数トークンで構築する。
    pub fn new(
        registry: Arc<LinkRegistry>,
        storage: Arc<dyn ObjectStorage>,
        ttl: TimeDelta,
    ) -> Self {
        Self {
            registry,
            storage,
            clock: Arc::new(SystemClock),
            tokens: Arc::new(RandomTokens),
            ttl,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    pub fn registry(&self) -> &Arc<LinkRegistry> {
        &self.registry
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// 同じレジストリ・ストレージ・時計を共有する掃除タスクを作る。
    pub fn reaper(&self, interval: std::time::Duration) -> Reaper {
        Reaper::new(self.registry.clone(), self.storage.clone(), interval)
            .with_clock(self.clock.clone())
    }

    /// 画像を保存し、有効期限付きのトークンを発行する。
    pub async fn publish(
        &self,
        bytes: &[u8],
        original_name: &str,
    ) -> Result<PublishedLink, AccessError> {
        let object_name = self.store_object(bytes, original_name).await?;

        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let token = self.tokens.next_token();
            let Some(expires_at) = self.clock.now().checked_add_signed(self.ttl) else {
                self.discard_object(&object_name).await;
                return Err(AccessError::ExpiryOutOfRange(self.ttl.num_seconds()));
            };
            let entry = LinkEntry {
                token: token.clone(),
                object_name: object_name.clone(),
                expires_at,
            };
            match self.registry.insert(entry).await {
                Ok(()) => {
                    tracing::info!(
                        token = %token,
                        object = %object_name,
                        size = bytes.len(),
                        expires_at = %expires_at.to_rfc3339(),
                        "リンクを発行"
                    );
                    return Ok(PublishedLink {
                        token,
                        object_name,
                        expires_at,
                    });
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "トークンを引き直します");
                }
            }
        }

        self.discard_object(&object_name).await;
        Err(AccessError::Exhausted(MAX_TOKEN_ATTEMPTS))
    }

    /// 登録に至らなかったオブジェクトを削除する。参照されないオブジェクトを残さない。
    async fn discard_object(&self, object_name: &str) {
        if let Err(e) = self.storage.delete(object_name).await {
            tracing::warn!(object = %object_name, error = %e, "未登録オブジェクトの削除に失敗");
        }
    }

    async fn store_object(
        &self,
        bytes: &[u8],
        original_name: &str,
    ) -> Result<String, AccessError> {
        let extension = sanitize_extension(original_name);
        for _ in 0..MAX_OBJECT_NAME_ATTEMPTS {
            let object_name = format!("{}{extension}", uuid::Uuid::new_v4().simple());
            match self.storage.put(&object_name, bytes).await {
                Ok(()) => return Ok(object_name),
                Err(StorageError::AlreadyExists(name)) => {
                    tracing::warn!(object = %name, "オブジェクト名が衝突しました");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(AccessError::Exhausted(MAX_OBJECT_NAME_ATTEMPTS))
    }

    /// トークンに対応する画像を返す。
    ///
    /// 期限切れならオブジェクトとエントリを削除して `Expired` を返す。
    pub async fn resolve(&self, raw_token: &str) -> Result<ResolveOutcome, AccessError> {
        let Some(token) = LinkToken::parse(raw_token) else {
            return Ok(ResolveOutcome::NotFound);
        };
        let Some(entry) = self.registry.lookup(&token).await else {
            return Ok(ResolveOutcome::NotFound);
        };

        if entry.is_expired_at(self.clock.now()) {
            return Ok(match remove_link(&self.registry, self.storage.as_ref(), &entry).await {
                Removal::Removed => {
                    tracing::info!(token = %token, "期限切れリンクを削除");
                    ResolveOutcome::Expired
                }
                Removal::AlreadyGone => ResolveOutcome::NotFound,
                Removal::Retained(e) => {
                    tracing::warn!(
                        token = %token,
                        object = %entry.object_name,
                        error = %e,
                        "期限切れオブジェクトの削除に失敗。掃除タスクで再試行します"
                    );
                    ResolveOutcome::Expired
                }
            });
        }

        match self.storage.get(&entry.object_name).await {
            Ok(bytes) => Ok(ResolveOutcome::Found(StoredImage {
                object_name: entry.object_name,
                bytes,
                expires_at: entry.expires_at,
            })),
            Err(StorageError::NotFound(_)) => {
                tracing::warn!(
                    token = %token,
                    object = %entry.object_name,
                    "有効なリンクのオブジェクトが存在しません"
                );
                Ok(ResolveOutcome::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }
}
