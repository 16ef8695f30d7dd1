//! WorkItemApi port - ジョブ投入と状態取得

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ApiFailure, WorkItemId, WorkItemRequest, WorkItemStatus};

/// Work item as returned by submit and status reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemInfo {
    pub id: WorkItemId,
    pub status: WorkItemStatus,
    /// Service-side execution log, when one has been produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
}

/// WorkItemApi は work item の投入と 1 回の状態取得だけを行う
///
/// キャンセル操作はない（呼び出し側は待機をやめるだけで、リモートでは実行が続く）。
#[async_trait]
pub trait WorkItemApi: Send + Sync {
    async fn submit(&self, request: &WorkItemRequest) -> Result<WorkItemInfo, ApiFailure>;

    async fn status(&self, id: &WorkItemId) -> Result<WorkItemInfo, ApiFailure>;
}

#[async_trait]
impl<W: WorkItemApi + ?Sized> WorkItemApi for Arc<W> {
    async fn submit(&self, request: &WorkItemRequest) -> Result<WorkItemInfo, ApiFailure> {
        (**self).submit(request).await
    }

    async fn status(&self, id: &WorkItemId) -> Result<WorkItemInfo, ApiFailure> {
        (**self).status(id).await
    }
}
