//! Pledge listing query: sort key, direction and head-truncation.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::pledge::Pledge;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Amount,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// 未知の sortBy / sortOrder
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported {field} value: {value:?}")]
pub struct UnknownSortKey {
    pub field: &'static str,
    pub value: String,
}

impl FromStr for SortBy {
    type Err = UnknownSortKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amount" => Ok(SortBy::Amount),
            "date" => Ok(SortBy::Date),
            _ => Err(UnknownSortKey {
                field: "sortBy",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for SortOrder {
    type Err = UnknownSortKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(UnknownSortKey {
                field: "sortOrder",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortBy::Amount => "amount",
            SortBy::Date => "date",
        })
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        })
    }
}

/// Stateless listing request. Default is amount / desc / unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PledgeQuery {
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub limit: Option<usize>,
}

impl PledgeQuery {
    pub fn new(sort_by: SortBy, sort_order: SortOrder) -> Self {
        Self {
            sort_by,
            sort_order,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Total order used by every listing.
    ///
    /// The primary key follows `sort_by`/`sort_order`; ties always fall back
    /// to earliest `created_at`, then pledge id, so output is deterministic.
    pub fn compare(&self, a: &Pledge, b: &Pledge) -> Ordering {
        let primary = match self.sort_by {
            SortBy::Amount => a.amount.cmp(&b.amount),
            SortBy::Date => a.created_at.cmp(&b.created_at),
        };
        let primary = match self.sort_order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Sort and truncate in place.
    pub fn apply(&self, pledges: &mut Vec<Pledge>) {
        pledges.sort_by(|a, b| self.compare(a, b));
        if let Some(limit) = self.limit {
            pledges.truncate(limit);
        }
    }
}
