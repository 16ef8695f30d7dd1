//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **http**: 本番の REST API（reqwest）
//! - **memory**: InMemoryService（テスト・dry run 用、409/404 の意味も再現）

pub mod http;
pub mod memory;

// 主要な型を再エクスポート
pub use self::http::HttpBackend;
pub use self::memory::{FakeOp, InMemoryService};
