//! App - アプリケーション層
//!
//! ports を組み合わせて、リモートサービスに対する手順を実装します。
//!
//! # 主要コンポーネント
//! - **StorageClient**: container 作成と 3 段階アップロード（409 は成功扱い）
//! - **idempotent_upsert / Publisher**: bundle と activity のバージョン登録と alias
//! - **Executor**: work item の投入と polling
//! - **collect_results**: 出力の best-effort 収集
//! - **Workflow**: provision / execute の手順全体

pub mod executor;
pub mod publisher;
pub mod results;
pub mod storage;
pub mod upsert;
pub mod workflow;

// 主要な型を再エクスポート
pub use self::executor::{Executor, PollPolicy};
pub use self::publisher::{AliasIntent, AliasOutcome, Deletion, Publication, Publisher};
pub use self::results::collect_results;
pub use self::storage::{ContainerOutcome, StorageClient, UploadedObject};
pub use self::upsert::{Upserted, idempotent_upsert};
pub use self::workflow::{Provisioned, Workflow};
