//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: PledgeApi の構築とワイヤリング
//! - **PledgeApi**: 認可・入力検証の境界（書き込み + 読み込み）
//! - **TaskStatusSync**: task のキャッシュ集計を ledger に合わせる
//! - **RetryPolicy**: 一時的なストアエラーのリトライ
//! - **wire**: JSON のリクエスト / レスポンス形

pub mod api;
pub mod builder;
pub mod retry;
pub mod sync;
pub mod wire;

// 主要な型を再エクスポート
pub use self::api::{ContributorPledge, PledgeApi, RankedContributor, TaskFunding};
pub use self::builder::{AppBuilder, BuildError};
pub use self::retry::RetryPolicy;
pub use self::sync::TaskStatusSync;
pub use self::wire::{
    ContributorPledgeView, ContributorView, ErrorBody, ListPledgesParams, PledgeRequest,
    PledgeView, TaskFundingView,
};
