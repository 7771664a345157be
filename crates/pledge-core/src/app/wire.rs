//! Wire - JSON のリクエスト / レスポンス形
//!
//! 外部（UI / モバイル）とやり取りする形はここに閉じ込めます。
//! リクエストは緩く受け取り（`Option<String>` / `Value`）、`parse()` で
//! ドメイン型に変換します。変換に失敗したら `InvalidInput` です。
//!
//! 金額は JSON number として出力します。

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Amount, ErrorKind, Pledge, PledgeError, PledgeId, PledgeQuery, SortBy, SortOrder, TaskId,
    TaskStatus, UserId,
};

use super::api::{ContributorPledge, RankedContributor, TaskFunding};

/// `POST pledge` body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PledgeRequest {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
}

impl PledgeRequest {
    pub fn new(task_id: TaskId, amount: impl Into<serde_json::Value>) -> Self {
        Self {
            task_id: Some(task_id.to_string()),
            amount: Some(amount.into()),
        }
    }

    pub fn parse(&self) -> Result<(TaskId, Amount), PledgeError> {
        let task_id = parse_task_id(self.task_id.as_deref())?;
        let amount = match &self.amount {
            Some(value) => Amount::from_json(value)?,
            None => return Err(PledgeError::InvalidInput("amount is required".to_string())),
        };
        Ok((task_id, amount))
    }
}

/// `GET pledges?taskId&sortBy&sortOrder&limit`
///
/// 空文字は「指定なし」として扱います。`limit=0` は無制限です。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPledgesParams {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
}

impl ListPledgesParams {
    pub fn for_task(task_id: TaskId) -> Self {
        Self {
            task_id: Some(task_id.to_string()),
            ..Self::default()
        }
    }

    pub fn sorted(mut self, sort_by: SortBy, sort_order: SortOrder) -> Self {
        self.sort_by = Some(sort_by.to_string());
        self.sort_order = Some(sort_order.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit.to_string());
        self
    }

    pub fn parse(&self) -> Result<(TaskId, PledgeQuery), PledgeError> {
        let task_id = parse_task_id(self.task_id.as_deref())?;

        let sort_by = match present(self.sort_by.as_deref()) {
            Some(raw) => raw.parse::<SortBy>().map_err(invalid)?,
            None => SortBy::default(),
        };
        let sort_order = match present(self.sort_order.as_deref()) {
            Some(raw) => raw.parse::<SortOrder>().map_err(invalid)?,
            None => SortOrder::default(),
        };

        let mut query = PledgeQuery::new(sort_by, sort_order);
        if let Some(raw) = present(self.limit.as_deref()) {
            let limit = raw.parse::<usize>().map_err(|_| {
                PledgeError::InvalidInput(format!(
                    "limit must be a non-negative integer, got {raw:?}"
                ))
            })?;
            if limit > 0 {
                query = query.with_limit(limit);
            }
        }
        Ok((task_id, query))
    }
}

fn present(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

fn invalid(err: impl std::fmt::Display) -> PledgeError {
    PledgeError::InvalidInput(err.to_string())
}

fn parse_task_id(raw: Option<&str>) -> Result<TaskId, PledgeError> {
    let raw = present(raw).ok_or_else(|| PledgeError::InvalidInput("taskId is required".into()))?;
    raw.parse::<TaskId>().map_err(invalid)
}

/// Pledge record as returned by `POST pledge`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PledgeView {
    pub id: PledgeId,
    pub task_id: TaskId,
    pub user_id: UserId,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Pledge> for PledgeView {
    fn from(p: &Pledge) -> Self {
        Self {
            id: p.id,
            task_id: p.task_id,
            user_id: p.user_id.clone(),
            amount: p.amount.value(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// One row of `GET pledges`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributorPledgeView {
    pub id: PledgeId,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl From<&ContributorPledge> for ContributorPledgeView {
    fn from(row: &ContributorPledge) -> Self {
        Self {
            id: row.pledge.id,
            amount: row.pledge.amount.value(),
            created_at: row.pledge.created_at,
            user_id: row.pledge.user_id.clone(),
            display_name: row.display_name.clone(),
            avatar_url: row.avatar_url.clone(),
        }
    }
}

/// One entry of the top-contributors strip
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributorView {
    pub user_id: UserId,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl From<&RankedContributor> for ContributorView {
    fn from(c: &RankedContributor) -> Self {
        Self {
            user_id: c.user_id.clone(),
            amount: c.amount.value(),
            display_name: c.display_name.clone(),
            avatar_url: c.avatar_url.clone(),
        }
    }
}

/// Task funding figures
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFundingView {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub pledged_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub goal_amount: Decimal,
    pub contributor_count: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub funding_percentage: Decimal,
}

impl From<&TaskFunding> for TaskFundingView {
    fn from(f: &TaskFunding) -> Self {
        Self {
            task_id: f.task_id,
            status: f.status,
            pledged_amount: f.pledged_amount,
            goal_amount: f.goal_amount,
            contributor_count: f.contributor_count,
            funding_percentage: f.funding_percentage,
        }
    }
}

/// Structured error `{kind, message}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&PledgeError> for ErrorBody {
    fn from(err: &PledgeError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
