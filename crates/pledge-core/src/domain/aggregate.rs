//! AggregationEngine - ledger から派生値を計算する純粋関数群
//!
//! ストアには一切触れません。入力は task の pledge 集合だけです。
//!
//! - `total_pledged`: 金額の合計（空なら 0）
//! - `contributor_count`: ユニークな user_id の数（行数ではない）
//! - `top_contributors`: 金額降順、同額は created_at の早い順
//! - `funding_percentage`: total / goal * 100（goal が 0 なら 0）

use std::collections::HashSet;

use rust_decimal::Decimal;

use super::ids::UserId;
use super::money::Amount;
use super::pledge::{LedgerSnapshot, Pledge};
use super::query::PledgeQuery;
use super::task::TaskAggregates;

/// One entry of a contributor ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    pub user_id: UserId,
    pub amount: Amount,
}

/// Sum of all amounts. Saturates instead of overflowing.
pub fn total_pledged(pledges: &[Pledge]) -> Decimal {
    pledges
        .iter()
        .fold(Decimal::ZERO, |acc, p| acc.saturating_add(p.amount.value()))
}

/// Number of distinct contributors.
pub fn contributor_count(pledges: &[Pledge]) -> u64 {
    pledges
        .iter()
        .map(|p| &p.user_id)
        .collect::<HashSet<_>>()
        .len() as u64
}

/// Ranked contributors, truncated to `n`. Deterministic for identical input.
pub fn top_contributors(pledges: &[Pledge], n: usize) -> Vec<Contribution> {
    let ranking = PledgeQuery::default();
    let mut sorted: Vec<&Pledge> = pledges.iter().collect();
    sorted.sort_by(|a, b| ranking.compare(a, b));
    sorted
        .into_iter()
        .take(n)
        .map(|p| Contribution {
            user_id: p.user_id.clone(),
            amount: p.amount,
        })
        .collect()
}

/// `total / goal * 100`, never negative, and exactly zero for a zero goal.
pub fn funding_percentage(total_pledged: Decimal, goal_amount: Decimal) -> Decimal {
    if goal_amount <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let ratio = total_pledged
        .checked_div(goal_amount)
        .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::MAX);
    ratio.max(Decimal::ZERO).normalize()
}

/// Both cached fields at once, tagged with the revision they were read at.
pub fn summarize(snapshot: &LedgerSnapshot) -> TaskAggregates {
    TaskAggregates {
        pledged_amount: total_pledged(&snapshot.pledges),
        contributor_count: contributor_count(&snapshot.pledges),
        ledger_revision: snapshot.revision,
    }
}
