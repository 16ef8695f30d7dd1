//! flatline-core
//!
//! Provisioning and execution of parametric DXF export jobs on a remote
//! job-execution service.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, version, definition, arguments, status, dimensions, report, errors）
//! - **ports**: 抽象化レイヤー（TokenProvider, ObjectStore, DefinitionRegistry, WorkItemApi, Clock, など）
//! - **app**: アプリケーションロジック（storage, upsert, publisher, executor, results, workflow）
//! - **impls**: 実装（HTTP と InMemory）
//! - **config**: 設定の読み込み（figment）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use config::FlowConfig;
pub use domain::{FlowError, FlowResult};
