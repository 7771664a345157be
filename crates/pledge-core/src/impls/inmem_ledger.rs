//! InMemoryLedger - 開発・テスト用の正本
//!
//! TaskStore と PledgeStore の両方を 1 つのロックの内側で実装します。
//! 各メソッドはロックを取ってから返すまでが 1 つのアトミックな単位で、
//! 本番ストアの「単一レコード単位のアトミック性」と同じ保証になります。
//!
//! # 実装詳細
//! - `tasks`: TaskId → Task
//! - `ledgers`: TaskId → TaskLedger（user ごとの pledge + revision）
//! - `(task_id, user_id)` の一意性は `TaskLedger::pledges` の HashMap キーで保証

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    Amount, CommittedPledge, LedgerSnapshot, Pledge, PledgeId, PledgeQuery, StoreError, Task,
    TaskAggregates, TaskId, UserId,
};
use crate::ports::{PledgeStore, TaskStore};

/// One task's pledges plus its monotone revision.
#[derive(Debug, Default)]
struct TaskLedger {
    revision: u64,
    pledges: HashMap<UserId, Pledge>,
}

#[derive(Debug, Default)]
struct InMemoryLedgerState {
    tasks: HashMap<TaskId, Task>,
    ledgers: HashMap<TaskId, TaskLedger>,
}

impl InMemoryLedgerState {
    fn ensure_task(&self, task_id: TaskId) -> Result<(), StoreError> {
        if self.tasks.contains_key(&task_id) {
            Ok(())
        } else {
            Err(StoreError::TaskNotFound(task_id))
        }
    }

    fn pledges_of(&self, task_id: TaskId) -> Vec<Pledge> {
        self.ledgers
            .get(&task_id)
            .map(|ledger| ledger.pledges.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// In-memory TaskStore + PledgeStore.
///
/// Clone は同じ状態を共有します（`Arc` の内側）。
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<InMemoryLedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全 task の pledge 行数（デバッグ用）
    pub async fn pledge_count(&self) -> usize {
        let state = self.state.lock().await;
        state.ledgers.values().map(|l| l.pledges.len()).sum()
    }
}

#[async_trait]
impl TaskStore for InMemoryLedger {
    async fn create_task(&self, task: Task) -> Result<Task, StoreError> {
        let mut state = self.state.lock().await;
        match state.tasks.entry(task.id) {
            Entry::Occupied(_) => Err(StoreError::TaskAlreadyExists(task.id)),
            Entry::Vacant(slot) => Ok(slot.insert(task).clone()),
        }
    }

    async fn get_task(&self, task_id: TaskId) -> Result<Option<Task>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.tasks.get(&task_id).cloned())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    async fn apply_aggregates(
        &self,
        task_id: TaskId,
        aggregates: TaskAggregates,
        now: DateTime<Utc>,
    ) -> Result<Task, StoreError> {
        let mut state = self.state.lock().await;
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))?;

        let revision = aggregates.ledger_revision;
        if !task.apply_aggregates(aggregates, now) {
            tracing::debug!(
                %task_id,
                stale_revision = revision,
                current_revision = task.aggregates.ledger_revision,
                "ignored aggregates from an older ledger revision"
            );
        }
        Ok(task.clone())
    }
}

#[async_trait]
impl PledgeStore for InMemoryLedger {
    async fn upsert_pledge(
        &self,
        new_id: PledgeId,
        task_id: TaskId,
        user_id: UserId,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<CommittedPledge, StoreError> {
        let mut state = self.state.lock().await;
        state.ensure_task(task_id)?;

        let ledger = state.ledgers.entry(task_id).or_default();
        let pledge = match ledger.pledges.entry(user_id) {
            Entry::Occupied(mut row) => {
                row.get_mut().revise(amount, now);
                row.get().clone()
            }
            Entry::Vacant(slot) => {
                let user_id = slot.key().clone();
                slot.insert(Pledge::new(new_id, task_id, user_id, amount, now))
                    .clone()
            }
        };
        ledger.revision += 1;

        tracing::debug!(
            %task_id,
            user_id = %pledge.user_id,
            pledge_id = %pledge.id,
            revision = ledger.revision,
            "pledge upserted"
        );
        Ok(CommittedPledge {
            pledge,
            ledger_revision: ledger.revision,
        })
    }

    async fn get_pledge(
        &self,
        task_id: TaskId,
        user_id: &UserId,
    ) -> Result<Option<Pledge>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .ledgers
            .get(&task_id)
            .and_then(|ledger| ledger.pledges.get(user_id))
            .cloned())
    }

    async fn list_pledges(
        &self,
        task_id: TaskId,
        query: PledgeQuery,
    ) -> Result<Vec<Pledge>, StoreError> {
        let state = self.state.lock().await;
        state.ensure_task(task_id)?;
        let mut pledges = state.pledges_of(task_id);
        query.apply(&mut pledges);
        Ok(pledges)
    }

    async fn ledger_snapshot(&self, task_id: TaskId) -> Result<LedgerSnapshot, StoreError> {
        let state = self.state.lock().await;
        state.ensure_task(task_id)?;
        Ok(LedgerSnapshot {
            revision: state.ledgers.get(&task_id).map_or(0, |l| l.revision),
            pledges: state.pledges_of(task_id),
        })
    }
}
