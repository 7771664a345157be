//! TaskStore port - task レコードの正本
//!
//! TaskStore は以下を管理します：
//! - task の goal と status
//! - ledger から派生したキャッシュ集計（pledged_amount, contributor_count）
//!
//! # 設計原則
//! - すべての操作は単一レコード単位でアトミック
//! - キャッシュ集計を書くのは TaskStatusSync だけ（`apply_aggregates`）
//! - `apply_aggregates` は ledger revision による条件付き書き込み。
//!   古い revision のスナップショットは無視される（PostgreSQL なら
//!   `UPDATE tasks SET ... WHERE id = $1 AND ledger_revision <= $4`）

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{StoreError, Task, TaskAggregates, TaskId};

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 新しい task を登録。同じ ID があれば `TaskAlreadyExists`
    async fn create_task(&self, task: Task) -> Result<Task, StoreError>;

    /// ID で取得。存在しなければ `None`
    async fn get_task(&self, task_id: TaskId) -> Result<Option<Task>, StoreError>;

    /// 全 task を created_at 昇順で返す
    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError>;

    /// キャッシュ集計をスナップショットごと置き換える（差分更新はしない）
    ///
    /// 戻り値は書き込み後（無視された場合は現在）の task。
    async fn apply_aggregates(
        &self,
        task_id: TaskId,
        aggregates: TaskAggregates,
        now: DateTime<Utc>,
    ) -> Result<Task, StoreError>;
}
