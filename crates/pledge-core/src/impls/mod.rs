//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryLedger**: TaskStore + PledgeStore の正本
//! - **InMemoryProfileDirectory**: プロフィール参照
//!
//! 本番用の実装（PostgreSQL など）は組み込み側のクレートに配置します。

pub mod inmem_ledger;
pub mod inmem_profiles;

pub use self::inmem_ledger::InMemoryLedger;
pub use self::inmem_profiles::InMemoryProfileDirectory;
