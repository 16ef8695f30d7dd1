//! TokenProvider port - 認証トークンの取得
//!
//! # 設計原則
//! - トークンは実行ごとに取り直す（キャッシュしない）
//! - 失敗は致命的（リトライしない）

use async_trait::async_trait;

use crate::domain::{Credentials, FlowResult, Scopes, Token};

/// TokenProvider はサービスアカウントの資格情報を bearer token に交換
///
/// 2xx 以外は `FlowError::Auth` を返します。
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn acquire(&self, credentials: &Credentials, scopes: &Scopes) -> FlowResult<Token>;
}
