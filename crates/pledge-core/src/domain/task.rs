//! Task record: goal + cached aggregates + lifecycle status.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::money::{Amount, InvalidAmount};

/// Task lifecycle status.
///
/// Driven by external actors (owner accepts, completes, closes). Pledge
/// aggregation never writes this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    New,
    Pledged,
    Accepted,
    Completed,
    Closed,
}

/// Cached ledger summary stored on the task.
///
/// `ledger_revision` is the PledgeStore revision the figures were computed
/// from. Stores refuse to replace a snapshot with one from an older revision.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskAggregates {
    pub pledged_amount: Decimal,
    pub contributor_count: u64,
    pub ledger_revision: u64,
}

impl TaskAggregates {
    /// Same figures, ignoring which revision they came from.
    pub fn same_figures(&self, other: &TaskAggregates) -> bool {
        self.pledged_amount == other.pledged_amount
            && self.contributor_count == other.contributor_count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub goal_amount: Amount,
    pub status: TaskStatus,
    pub aggregates: TaskAggregates,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a fresh task with empty aggregates. The goal must be positive.
    pub fn new(id: TaskId, goal_amount: Decimal, now: DateTime<Utc>) -> Result<Self, InvalidAmount> {
        Ok(Self {
            id,
            goal_amount: Amount::new(goal_amount)?,
            status: TaskStatus::New,
            aggregates: TaskAggregates::default(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace the cached aggregates unless `next` comes from an older ledger
    /// revision. Returns whether the snapshot was applied.
    pub fn apply_aggregates(&mut self, next: TaskAggregates, now: DateTime<Utc>) -> bool {
        if next.ledger_revision < self.aggregates.ledger_revision {
            return false;
        }
        if self.aggregates != next {
            self.aggregates = next;
            self.updated_at = now;
        }
        true
    }
}
