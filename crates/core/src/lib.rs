//! # Imagelink Core
//!
//! アップロード画像を推測不能なトークンで一時公開するための中核ロジック。
//!
//! ## 構成
//! - `registry`: トークン → (オブジェクト名, 有効期限) の対応表。並行アクセスに対して原子的。
//! - `snapshot`: 対応表のJSONファイルへの永続化（変更ごとに全体を書き直す）
//! - `storage`: 画像バイト列の保存先（ファイルシステム実装）
//! - `access`: リクエスト側の操作 `publish` / `resolve`（アクセス時の遅延失効を含む）
//! - `reaper`: 一定間隔で期限切れリンクを掃除するバックグラウンドタスク
//! - `bbox`: 画像認識サービスの応答テキストの解析
//!
//! ## 失効の二重経路
//! 期限切れは `resolve` 時の同期チェックと `reaper` の定期掃除の両方で検出する。
//! 前者は期限切れ画像を決して返さないこと、後者は読み出しが無くてもストレージが回収されることを保証する。

pub mod access;
pub mod bbox;
pub mod clock;
pub mod reaper;
pub mod registry;
pub mod snapshot;
pub mod storage;
pub mod token;

pub use access::{AccessError, AccessGateway, PublishedLink, ResolveOutcome, StoredImage};
pub use clock::{Clock, ManualClock, SystemClock};
pub use reaper::{Reaper, SweepReport};
pub use registry::{LinkEntry, LinkRegistry, RegistryError};
pub use snapshot::{JsonFileStore, SnapshotError, SnapshotStore};
pub use storage::{FilesystemStorage, ObjectStorage, StorageError};
pub use token::{LinkToken, RandomTokens, TokenSource};
