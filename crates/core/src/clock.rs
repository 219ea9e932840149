//! # 時計
//!
//! 有効期限の判定に使う現在時刻の取得を抽象化する。
//! テストでは `ManualClock` で時刻を進めてTTL経過を再現する。

use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};

/// 現在時刻の供給元。
pub trait Clock: Send + Sync {
    /// 現在時刻（UTC）
    fn now(&self) -> DateTime<Utc>;
}

/// システム時計。
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手動で進める時計。
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// 指定時刻から開始する。
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// 時刻を `delta` だけ進める。
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += delta;
    }

    /// 時刻を設定する。
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
