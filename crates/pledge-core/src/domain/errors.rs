//! Errors - エラー型と分類
//!
//! # 層ごとのエラー
//! - `StoreError`: ストア（ports）が返すエラー。Conflict / Unavailable は一時的
//! - `ProfileError`: プロフィール参照の失敗（呼び出し側でフォールバック）
//! - `PledgeError`: API 境界のエラー。`ErrorKind` で運用分類する

use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::money::InvalidAmount;

/// ErrorKind は境界エラーの分類（ワイヤ上の `kind`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// 入力不正。ストアには触れていない
    InvalidInput,
    /// 呼び出し元の identity が確立できない
    Unauthorized,
    /// 参照先の task / user が存在しない
    NotFound,
    /// 一時的な書き込み競合。同じ入力で再試行してよい
    ConflictRetryable,
    /// ストアまたは依存サービスに到達できない
    Unavailable,
}

/// StoreError はストア ports のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("task already exists: {0}")]
    TaskAlreadyExists(TaskId),

    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Conflict / Unavailable はリトライ対象
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Unavailable(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("profile lookup unavailable: {0}")]
    Unavailable(String),
}

/// PledgeError は API 境界のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PledgeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict, retry the request: {0}")]
    ConflictRetryable(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl PledgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PledgeError::InvalidInput(_) => ErrorKind::InvalidInput,
            PledgeError::Unauthorized(_) => ErrorKind::Unauthorized,
            PledgeError::NotFound(_) => ErrorKind::NotFound,
            PledgeError::ConflictRetryable(_) => ErrorKind::ConflictRetryable,
            PledgeError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }
}

impl From<InvalidAmount> for PledgeError {
    fn from(err: InvalidAmount) -> Self {
        PledgeError::InvalidInput(err.to_string())
    }
}

impl From<StoreError> for PledgeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TaskNotFound(_) => PledgeError::NotFound(err.to_string()),
            StoreError::TaskAlreadyExists(_) => PledgeError::InvalidInput(err.to_string()),
            StoreError::Conflict(_) => PledgeError::ConflictRetryable(err.to_string()),
            StoreError::Unavailable(_) => PledgeError::Unavailable(err.to_string()),
        }
    }
}
