//! # アクセストークン
//!
//! 画像URLの一部となる不透明なトークン。128ビットの乱数を小文字16進32文字で表す。

use std::fmt;

use rand::RngCore;

/// トークンのバイト長（128ビット）
pub const TOKEN_BYTES: usize = 16;

/// リンク1件を識別する不透明トークン。レジストリの唯一のキー。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkToken(String);

impl LinkToken {
    /// OSの乱数源から新しいトークンを生成する。
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// 外部から受け取った文字列をトークンとして解釈する。
    ///
    /// 32文字の16進数以外は `None`。大文字は小文字に正規化する。
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() != TOKEN_BYTES * 2 || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// トークンの供給元。
///
/// 本番は `RandomTokens`。衝突時の再試行を検証するため差し替え可能にしている。
pub trait TokenSource: Send + Sync {
    /// 次のトークンを返す。
    fn next_token(&self) -> LinkToken;
}

/// OS乱数によるトークン供給元。
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomTokens;

impl TokenSource for RandomTokens {
    fn next_token(&self) -> LinkToken {
        LinkToken::generate()
    }
}
