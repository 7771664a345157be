//! AppBuilder - PledgeApi の構築とワイヤリング
//!
//! ストアはグローバルなシングルトンではなく、組み込み側が作って渡します。
//! `build()` は必須コンポーネントが揃っているかを起動時に検証します
//! （Fail-fast）。
//!
//! # 必須
//! - TaskStore / PledgeStore
//!
//! # 省略時のデフォルト
//! - Clock: SystemClock
//! - IdGenerator: UlidGenerator（上の Clock を使う）
//! - ProfileDirectory: 空の InMemoryProfileDirectory（全員 "Anonymous"）

use std::sync::Arc;

use crate::config::{LedgerConfig, ListingSettings};
use crate::impls::{InMemoryLedger, InMemoryProfileDirectory};
use crate::ports::{
    Clock, IdGenerator, PledgeStore, ProfileDirectory, SystemClock, TaskStore, UlidGenerator,
};

use super::api::PledgeApi;
use super::retry::RetryPolicy;

/// AppBuilder は PledgeApi を構築
///
/// # 使用例
/// ```ignore
/// let ledger = InMemoryLedger::new();
/// let api = AppBuilder::new()
///     .in_memory_ledger(ledger)
///     .with_config(&LedgerConfig::load(None)?)
///     .build()?;
/// ```
#[derive(Default)]
pub struct AppBuilder {
    tasks: Option<Arc<dyn TaskStore>>,
    pledges: Option<Arc<dyn PledgeStore>>,
    profiles: Option<Arc<dyn ProfileDirectory>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    retry: RetryPolicy,
    listing: ListingSettings,
}

/// BuildError は構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing components: {0:?}. These must be provided before build().")]
    MissingComponents(Vec<&'static str>),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_store(mut self, tasks: Arc<dyn TaskStore>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn pledge_store(mut self, pledges: Arc<dyn PledgeStore>) -> Self {
        self.pledges = Some(pledges);
        self
    }

    /// 同じ InMemoryLedger を TaskStore と PledgeStore の両方に使う
    pub fn in_memory_ledger(self, ledger: InMemoryLedger) -> Self {
        self.task_store(Arc::new(ledger.clone()))
            .pledge_store(Arc::new(ledger))
    }

    pub fn profile_directory(mut self, profiles: Arc<dyn ProfileDirectory>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn listing(mut self, listing: ListingSettings) -> Self {
        self.listing = listing;
        self
    }

    /// retry / listing を設定から反映
    pub fn with_config(self, config: &LedgerConfig) -> Self {
        self.retry_policy(config.retry.policy())
            .listing(config.listing.clone())
    }

    /// # 検証
    /// - TaskStore / PledgeStore が未設定なら BuildError::MissingComponents
    pub fn build(self) -> Result<PledgeApi, BuildError> {
        let (tasks, pledges) = match (self.tasks, self.pledges) {
            (Some(tasks), Some(pledges)) => (tasks, pledges),
            (tasks, pledges) => {
                let mut missing = Vec::new();
                if tasks.is_none() {
                    missing.push("task_store");
                }
                if pledges.is_none() {
                    missing.push("pledge_store");
                }
                return Err(BuildError::MissingComponents(missing));
            }
        };

        let clock: Arc<dyn Clock> = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))) as Arc<dyn IdGenerator>);
        let profiles = self
            .profiles
            .unwrap_or_else(|| Arc::new(InMemoryProfileDirectory::new()) as Arc<dyn ProfileDirectory>);

        Ok(PledgeApi::new(
            tasks,
            pledges,
            profiles,
            clock,
            ids,
            self.retry,
            self.listing,
        ))
    }
}
