//! PledgeStore port - pledge の正本（ledger）
//!
//! # 一意性はストアが保証する
//! `(task_id, user_id)` あたり pledge は高々 1 行。アプリ側で
//! 「既存行を探してから insert/update」すると check-then-act の競合になるので、
//! upsert は 1 回の条件付き書き込みとして実装すること。
//! PostgreSQL なら unique 制約 + 以下の 1 文：
//!
//! ```sql
//! INSERT INTO pledges (id, task_id, user_id, amount, created_at, updated_at)
//! VALUES ($1, $2, $3, $4, $5, $5)
//! ON CONFLICT (task_id, user_id) DO UPDATE
//!   SET amount = EXCLUDED.amount, updated_at = EXCLUDED.updated_at
//! RETURNING *;
//! ```
//!
//! 同じ文の中で task ごとの ledger revision も 1 つ進める。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Amount, CommittedPledge, LedgerSnapshot, Pledge, PledgeId, PledgeQuery, StoreError, TaskId,
    UserId,
};

#[async_trait]
pub trait PledgeStore: Send + Sync {
    /// `(task_id, user_id)` の pledge を作成または更新する
    ///
    /// - 行がなければ `new_id` で作成
    /// - 行があれば amount を置き換え、updated_at を更新（`new_id` は捨てる）
    /// - task が存在しなければ `TaskNotFound`
    ///
    /// 戻り値にはこの書き込みで進んだ後の ledger revision が入る。
    async fn upsert_pledge(
        &self,
        new_id: PledgeId,
        task_id: TaskId,
        user_id: UserId,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<CommittedPledge, StoreError>;

    /// 1 user の現在の pledge（「自分の pledge」表示など組み込み側の読み込み用）
    ///
    /// 行がなければ `None`。task の存在は確認しない。
    async fn get_pledge(
        &self,
        task_id: TaskId,
        user_id: &UserId,
    ) -> Result<Option<Pledge>, StoreError>;

    /// ソート・件数制限付きの一覧。状態を持たないので何度でも呼べる
    async fn list_pledges(
        &self,
        task_id: TaskId,
        query: PledgeQuery,
    ) -> Result<Vec<Pledge>, StoreError>;

    /// task の ledger 全体と revision を同時に読む
    async fn ledger_snapshot(&self, task_id: TaskId) -> Result<LedgerSnapshot, StoreError>;
}
