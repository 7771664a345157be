//! Pledge record: one user's commitment toward one task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PledgeId, TaskId, UserId};
use super::money::Amount;

/// At most one row exists per `(task_id, user_id)`; later requests from the
/// same pair replace `amount` and refresh `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pledge {
    pub id: PledgeId,
    pub task_id: TaskId,
    pub user_id: UserId,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pledge {
    pub fn new(
        id: PledgeId,
        task_id: TaskId,
        user_id: UserId,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_id,
            user_id,
            amount,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the amount. The prior amount is discarded.
    pub fn revise(&mut self, amount: Amount, now: DateTime<Utc>) {
        self.amount = amount;
        self.updated_at = now;
    }
}

/// An upserted row together with the ledger revision the write produced.
///
/// Any resync that applies a snapshot at `ledger_revision` or later covers
/// this write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedPledge {
    pub pledge: Pledge,
    pub ledger_revision: u64,
}

/// The whole ledger of a task, read atomically together with its revision.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub revision: u64,
    pub pledges: Vec<Pledge>,
}
