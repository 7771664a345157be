//! TaskStatusSync - task のキャッシュ集計を ledger に合わせる
//!
//! # フロー
//! 1. PledgeStore::ledger_snapshot() で ledger 全体と revision を読む
//! 2. AggregationEngine で total と contributor 数をまとめて計算
//! 3. TaskStore::apply_aggregates() でスナップショットごと書き戻す
//!
//! status には触れません。古い revision の書き込みはストア側で捨てられるので、
//! 並行する resync が後から古い値で上書きすることはありません。

use std::sync::Arc;

use crate::domain::aggregate;
use crate::domain::{LedgerSnapshot, StoreError, Task, TaskId};
use crate::ports::{Clock, PledgeStore, TaskStore};

use super::retry::RetryPolicy;

#[derive(Clone)]
pub struct TaskStatusSync {
    tasks: Arc<dyn TaskStore>,
    pledges: Arc<dyn PledgeStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl TaskStatusSync {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        pledges: Arc<dyn PledgeStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            tasks,
            pledges,
            clock,
            retry,
        }
    }

    /// Recompute and persist both cached fields. Idempotent.
    #[tracing::instrument(skip_all, fields(task_id = %task_id))]
    pub async fn resync(&self, task_id: TaskId) -> Result<Task, StoreError> {
        let snapshot = self
            .retry
            .run("ledger_snapshot", || self.pledges.ledger_snapshot(task_id))
            .await?;
        self.resync_from(task_id, &snapshot).await
    }

    /// Persist aggregates computed from a snapshot the caller already read
    /// (read-repair path).
    pub async fn resync_from(
        &self,
        task_id: TaskId,
        snapshot: &LedgerSnapshot,
    ) -> Result<Task, StoreError> {
        let aggregates = aggregate::summarize(snapshot);
        let now = self.clock.now();

        let task = self
            .retry
            .run("apply_aggregates", || {
                self.tasks.apply_aggregates(task_id, aggregates.clone(), now)
            })
            .await?;

        tracing::debug!(
            revision = snapshot.revision,
            pledged_amount = %task.aggregates.pledged_amount,
            contributor_count = task.aggregates.contributor_count,
            "task aggregates resynced"
        );
        Ok(task)
    }
}
