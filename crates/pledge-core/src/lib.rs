//! pledge-core
//!
//! Pledge ledger and funding aggregation for crowd-funded tasks.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, money, task, pledge, profile, query, aggregate, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, PledgeStore, ProfileDirectory, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（builder, api, sync, retry, wire）
//! - **impls**: 実装（InMemoryLedger など開発用）
//! - **config**: 設定の読み込み（デフォルト → ファイル → 環境変数）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
