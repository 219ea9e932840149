//! # Reaper
//!
//! 一定間隔でレジストリを走査し、期限切れリンクのオブジェクトとエントリを削除する。
//!
//! - 走査はスナップショットに対して行い、レジストリのロックを保持したまま削除I/Oをしない。
//! - 1件の削除失敗で走査全体を中断しない（ログを残して次へ進む）。
//! - プロセス終了まで動き続ける。終了時に進行中の掃除を待つ必要はない。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::access::{is_managed_object_name, remove_link, Removal};
use crate::clock::{Clock, SystemClock};
use crate::registry::LinkRegistry;
use crate::storage::{ObjectStorage, StorageError};

/// 1回の掃除の結果。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// 走査したエントリ数
    pub scanned: usize,
    /// 期限切れとして削除したエントリ数
    pub removed: usize,
    /// 走査中に別経路（resolve）で削除済みだったエントリ数
    pub already_gone: usize,
    /// オブジェクトの削除に失敗し、次回に持ち越したエントリ数
    pub failed: usize,
}

/// 期限切れリンクの掃除タスク。
pub struct Reaper {
    registry: Arc<LinkRegistry>,
    storage: Arc<dyn ObjectStorage>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Reaper {
    pub fn new(
        registry: Arc<LinkRegistry>,
        storage: Arc<dyn ObjectStorage>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            storage,
            clock: Arc::new(SystemClock),
            interval,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 期限切れエントリを1回掃除する。
    pub async fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let entries = self.registry.snapshot().await;
        let mut report = SweepReport {
            scanned: entries.len(),
            ..SweepReport::default()
        };

        for entry in entries.iter().filter(|e| e.is_expired_at(now)) {
            match remove_link(&self.registry, self.storage.as_ref(), entry).await {
                Removal::Removed => report.removed += 1,
                Removal::AlreadyGone => report.already_gone += 1,
                Removal::Retained(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        token = %entry.token,
                        object = %entry.object_name,
                        error = %e,
                        "期限切れオブジェクトの削除に失敗。次回の掃除で再試行します"
                    );
                }
            }
        }

        if report.removed > 0 || report.failed > 0 {
            tracing::info!(
                scanned = report.scanned,
                removed = report.removed,
                failed = report.failed,
                "期限切れリンクを掃除"
            );
        } else {
            tracing::debug!(scanned = report.scanned, "期限切れリンクなし");
        }
        report
    }

    /// レジストリから参照されていないオブジェクトを削除する。
    ///
    /// 対象は `publish` が生成し得る名前のオブジェクトだけ。
    /// 書き込み済み・未登録のオブジェクトと区別できないため、リクエスト受付前の起動時にのみ呼ぶ。
    pub async fn reclaim_orphans(&self) -> Result<usize, StorageError> {
        let referenced: HashSet<String> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .map(|e| e.object_name)
            .collect();

        let mut reclaimed = 0;
        for name in self.storage.list().await? {
            // 同じディレクトリにある別のファイル（スナップショット等）には触れない
            if referenced.contains(&name) || !is_managed_object_name(&name) {
                continue;
            }
            match self.storage.delete(&name).await {
                Ok(_) => reclaimed += 1,
                Err(e) => {
                    tracing::warn!(object = %name, error = %e, "孤立オブジェクトの削除に失敗");
                }
            }
        }
        if reclaimed > 0 {
            tracing::info!(reclaimed, "孤立オブジェクトを削除");
        }
        Ok(reclaimed)
    }

    /// 掃除ループをバックグラウンドで開始する。
    ///
    /// 初回は即座に実行し、以降 `interval` ごとに実行する。
    /// 処理が遅れた周期は詰めて実行せずスキップする。
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(interval_secs = self.interval.as_secs(), "Reaperを開始");

            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }
}
