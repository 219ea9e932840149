//! # リンクレジストリ
//!
//! トークン → (オブジェクト名, 有効期限) の対応表。
//!
//! ## 並行性
//! - 対応表は単一の `RwLock` で保護する。ロックはメモリ上の操作の間だけ保持し、
//!   ファイルI/Oを跨いで保持することはない。
//! - 永続化は専用の書き込みロックで直列化する。書き込みロック取得後に対応表を
//!   読むため、古い状態が新しい状態を上書きすることはない。
//! - `lookup` / `snapshot` は永続化中でも待たされない。
//!
//! 有効期限の解釈はしない。期限切れの判定は `access` と `reaper` の責務。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use imagelink_types::PersistedLink;
use tokio::sync::{Mutex, RwLock};

use crate::snapshot::{PersistedLinks, SnapshotStore};
use crate::token::LinkToken;

/// レジストリ操作のエラー型。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// 同じトークンが既に登録されている（呼び出し側で新しいトークンを引き直す）
    #[error("トークンが衝突しました: {0}")]
    Collision(LinkToken),
    /// トークンが登録されていない
    #[error("トークンが見つかりません: {0}")]
    NotFound(LinkToken),
}

/// 公開中のリンク1件。
///
/// `expires_at` は作成後に変更されない（アクセスによる延長はしない）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    /// アクセストークン
    pub token: LinkToken,
    /// ストレージ上のオブジェクト名
    pub object_name: String,
    /// 有効期限
    pub expires_at: DateTime<Utc>,
}

impl LinkEntry {
    /// `now` 時点で期限切れかどうか。`expires_at` ちょうどは期限切れ。
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// トークンをキーとするリンクの対応表。
pub struct LinkRegistry {
    entries: RwLock<HashMap<LinkToken, LinkEntry>>,
    store: Option<Box<dyn SnapshotStore>>,
    persist_lock: Mutex<()>,
}

impl LinkRegistry {
    /// 永続化しないレジストリを作成する。
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            store: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// スナップショットから状態を復元する。
    ///
    /// 保存先が無い・壊れている場合は空のレジストリで起動する（起動失敗にはしない）。
    /// 以降の変更は全て `store` に書き戻される。
    pub async fn load(store: Box<dyn SnapshotStore>) -> Self {
        let persisted = match store.load().await {
            Ok(links) => links,
            Err(e) => {
                tracing::warn!(error = %e, "スナップショットを読み込めません。空のレジストリで起動します");
                PersistedLinks::new()
            }
        };

        let mut entries = HashMap::with_capacity(persisted.len());
        for (raw, link) in persisted {
            let Some(token) = LinkToken::parse(&raw) else {
                tracing::warn!(token = %raw, "不正なトークンをスキップ");
                continue;
            };
            entries.insert(
                token.clone(),
                LinkEntry {
                    token,
                    object_name: link.filename,
                    expires_at: link.expires,
                },
            );
        }
        tracing::info!(links = entries.len(), "レジストリを復元");

        Self {
            entries: RwLock::new(entries),
            store: Some(store),
            persist_lock: Mutex::new(()),
        }
    }

    /// エントリを登録する。同じトークンが既にあれば上書きせず `Collision`。
    pub async fn insert(&self, entry: LinkEntry) -> Result<(), RegistryError> {
        {
            let mut entries = self.entries.write().await;
            if entries.contains_key(&entry.token) {
                return Err(RegistryError::Collision(entry.token));
            }
            entries.insert(entry.token.clone(), entry);
        }
        self.persist().await;
        Ok(())
    }

    /// エントリを取得する。有効期限は解釈しない。
    pub async fn lookup(&self, token: &LinkToken) -> Option<LinkEntry> {
        self.entries.read().await.get(token).cloned()
    }

    /// エントリを削除する。
    ///
    /// 並行する別の呼び出しが先に削除していた場合は `NotFound`（エラーではなく通常の結果）。
    pub async fn delete(&self, token: &LinkToken) -> Result<LinkEntry, RegistryError> {
        let removed = self.entries.write().await.remove(token);
        match removed {
            Some(entry) => {
                self.persist().await;
                Ok(entry)
            }
            None => Err(RegistryError::NotFound(token.clone())),
        }
    }

    /// ある時点の全エントリのコピーを返す（順不同）。
    pub async fn snapshot(&self) -> Vec<LinkEntry> {
        self.entries.read().await.values().cloned().collect()
    }

    /// 登録件数
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn persisted_view(&self) -> PersistedLinks {
        self.entries
            .read()
            .await
            .values()
            .map(|entry| {
                (
                    entry.token.to_string(),
                    PersistedLink {
                        filename: entry.object_name.clone(),
                        expires: entry.expires_at,
                    },
                )
            })
            .collect()
    }

    /// 現在の状態全体を書き戻す。
    ///
    /// 失敗してもメモリ上の状態が正であり、次の変更時に再度書き戻される。
    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let _writer = self.persist_lock.lock().await;
        let links = self.persisted_view().await;
        if let Err(e) = store.persist(&links).await {
            tracing::warn!(error = %e, "スナップショットの書き込みに失敗");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeDelta;

    use crate::snapshot::JsonFileStore;

    fn entry(token: &LinkToken, name: &str) -> LinkEntry {
        LinkEntry {
            token: token.clone(),
            object_name: name.to_string(),
            expires_at: Utc::now() + TimeDelta::minutes(15),
        }
    }

    #[tokio::test]
    async fn test_insert_lookup_delete() {
        let registry = LinkRegistry::in_memory();
        let token = LinkToken::generate();

        registry.insert(entry(&token, "a.png")).await.unwrap();
        assert_eq!(registry.lookup(&token).await.unwrap().object_name, "a.png");
        assert_eq!(registry.len().await, 1);

        let removed = registry.delete(&token).await.unwrap();
        assert_eq!(removed.object_name, "a.png");
        assert!(registry.lookup(&token).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_collision_does_not_overwrite() {
        let registry = LinkRegistry::in_memory();
        let token = LinkToken::generate();

        registry.insert(entry(&token, "first.png")).await.unwrap();
        let err = registry.insert(entry(&token, "second.png")).await.unwrap_err();
        assert_eq!(err, RegistryError::Collision(token.clone()));
        assert_eq!(
            registry.lookup(&token).await.unwrap().object_name,
            "first.png"
        );
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let registry = LinkRegistry::in_memory();
        let token = LinkToken::generate();
        registry.insert(entry(&token, "a.png")).await.unwrap();

        assert!(registry.delete(&token).await.is_ok());
        assert_eq!(
            registry.delete(&token).await,
            Err(RegistryError::NotFound(token))
        );
    }

    #[tokio::test]
    async fn test_concurrent_delete_exactly_one_wins() {
        let registry = Arc::new(LinkRegistry::in_memory());
        let token = LinkToken::generate();
        registry.insert(entry(&token, "a.png")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move { registry.delete(&token).await }));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_no_lost_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.json");
        let registry =
            Arc::new(LinkRegistry::load(Box::new(JsonFileStore::new(&path))).await);

        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let token = LinkToken::generate();
                registry
                    .insert(entry(&token, &format!("{i}.png")))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.len().await, 32);
        assert_eq!(registry.snapshot().await.len(), 32);

        // 最後に書かれたスナップショットは最新状態と一致する
        let reloaded = LinkRegistry::load(Box::new(JsonFileStore::new(&path))).await;
        assert_eq!(reloaded.len().await, 32);
    }

    #[tokio::test]
    async fn test_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.json");
        let token = LinkToken::generate();
        let original = entry(&token, "a.png");

        {
            let registry = LinkRegistry::load(Box::new(JsonFileStore::new(&path))).await;
            registry.insert(original.clone()).await.unwrap();
        }

        let registry = LinkRegistry::load(Box::new(JsonFileStore::new(&path))).await;
        assert_eq!(registry.lookup(&token).await, Some(original));
    }

    #[tokio::test]
    async fn test_delete_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.json");
        let kept = LinkToken::generate();
        let removed = LinkToken::generate();

        {
            let registry = LinkRegistry::load(Box::new(JsonFileStore::new(&path))).await;
            registry.insert(entry(&kept, "kept.png")).await.unwrap();
            registry.insert(entry(&removed, "removed.png")).await.unwrap();
            registry.delete(&removed).await.unwrap();
        }

        let registry = LinkRegistry::load(Box::new(JsonFileStore::new(&path))).await;
        assert_eq!(registry.len().await, 1);
        assert!(registry.lookup(&kept).await.is_some());
        assert!(registry.lookup(&removed).await.is_none());

        registry.delete(&kept).await.unwrap();
        let reloaded = LinkRegistry::load(Box::new(JsonFileStore::new(&path))).await;
        assert!(reloaded.is_empty().await);
    }

    #[tokio::test]
    async fn test_load_missing_or_corrupt_is_empty() {
        let dir = tempfile::tempdir().unwrap();

        let missing = LinkRegistry::load(Box::new(JsonFileStore::new(
            dir.path().join("missing.json"),
        )))
        .await;
        assert!(missing.is_empty().await);

        let corrupt_path = dir.path().join("corrupt.json");
        std::fs::write(&corrupt_path, b"[1, 2").unwrap();
        let corrupt = LinkRegistry::load(Box::new(JsonFileStore::new(&corrupt_path))).await;
        assert!(corrupt.is_empty().await);
    }

    #[tokio::test]
    async fn test_load_skips_invalid_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.json");
        let valid = LinkToken::generate();
        std::fs::write(
            &path,
            format!(
                r#"{{
                    "{valid}": {{"filename": "a.png", "expires": "2030-01-01T00:00:00Z"}},
                    "../bad": {{"filename": "b.png", "expires": "2030-01-01T00:00:00Z"}}
                }}"#
            ),
        )
        .unwrap();

        let registry = LinkRegistry::load(Box::new(JsonFileStore::new(&path))).await;
        assert_eq!(registry.len().await, 1);
        assert!(registry.lookup(&valid).await.is_some());
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let link = LinkEntry {
            token: LinkToken::generate(),
            object_name: "a.png".to_string(),
            expires_at: now,
        };
        assert!(!link.is_expired_at(now - TimeDelta::milliseconds(1)));
        assert!(link.is_expired_at(now));
        assert!(link.is_expired_at(now + TimeDelta::seconds(1)));
    }
}
