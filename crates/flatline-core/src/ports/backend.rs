//! Backend port - リモートサービス一式への接続
//!
//! ストレージ・レジストリ・work item の呼び出しにはすべて bearer token が要るので、
//! まず `TokenProvider` で token を取り、それを渡して `Connection` を作ります。

use std::sync::Arc;

use crate::domain::{ActivitySpec, BundleSpec, Token};
use crate::ports::{DefinitionRegistry, ObjectStore, TokenProvider, WorkItemApi};

/// Token-bound handles for one run.
#[derive(Clone)]
pub struct Connection {
    pub objects: Arc<dyn ObjectStore>,
    pub bundles: Arc<dyn DefinitionRegistry<BundleSpec>>,
    pub activities: Arc<dyn DefinitionRegistry<ActivitySpec>>,
    pub work_items: Arc<dyn WorkItemApi>,
}

/// Backend は token の取得と、その token を使う各 port の生成を担う
///
/// # 実装
/// - **HttpBackend**: 本番の REST API
/// - **InMemoryService**: テスト・dry run 用
pub trait Backend: TokenProvider {
    fn connect(&self, token: Arc<Token>) -> Connection;
}
