//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（永続ストア、プロフィールサービス、時計、ID 採番）への
//! インターフェースで、実装は `impls` または組み込み側のクレートが提供します。
//!
//! # 設計原則
//! - ストアが source of truth（正本）。プロセス内に共有状態を持たない
//! - すべての依存はコンストラクタで注入（グローバルなクライアントは使わない）

pub mod clock;
pub mod id_generator;
pub mod pledge_store;
pub mod profile_directory;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::pledge_store::PledgeStore;
pub use self::profile_directory::ProfileDirectory;
pub use self::task_store::TaskStore;
