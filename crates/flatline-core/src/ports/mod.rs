//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（認証、ストレージ、ジョブサービス）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - 状態はすべてリモートサービスが持つ（ローカルは一時的なハンドルだけ）
//! - 時刻と待機も port にして、ポーリングを決定的にテストできるようにする

pub mod backend;
pub mod clock;
pub mod id_generator;
pub mod object_store;
pub mod registry;
pub mod token_provider;
pub mod work_items;

// 主要な trait を再エクスポート
pub use self::backend::{Backend, Connection};
pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::id_generator::{RunIdGenerator, UlidRunIdGenerator};
pub use self::object_store::{ObjectStore, UploadTarget};
pub use self::registry::DefinitionRegistry;
pub use self::token_provider::TokenProvider;
pub use self::work_items::{WorkItemApi, WorkItemInfo};
