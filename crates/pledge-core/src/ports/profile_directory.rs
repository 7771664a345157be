//! ProfileDirectory port - userId → 公開プロフィール
//!
//! プロフィールが見つからないのはエラーではありません（結果の map に入らないだけ）。

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{Profile, ProfileError, UserId};

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// まとめて引く。存在しない user はスキップ
    async fn lookup_profiles(
        &self,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, Profile>, ProfileError>;
}
