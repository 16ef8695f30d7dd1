//! Work item submission and status reads.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;

use super::ApiClient;
use crate::domain::{ApiFailure, Token, WorkItemId, WorkItemRequest};
use crate::ports::{WorkItemApi, WorkItemInfo};

pub struct HttpWorkItems {
    api: ApiClient,
    root: String,
    token: Arc<Token>,
}

impl HttpWorkItems {
    pub fn new(api: ApiClient, root: impl Into<String>, token: Arc<Token>) -> Self {
        Self {
            api,
            root: root.into(),
            token,
        }
    }
}

#[async_trait]
impl WorkItemApi for HttpWorkItems {
    async fn submit(&self, request: &WorkItemRequest) -> Result<WorkItemInfo, ApiFailure> {
        let url = self.api.endpoint(&self.root, &["workitems"]);
        self.api
            .send_json(Method::POST, url, Some(&*self.token), |r| r.json(request))
            .await
    }

    async fn status(&self, id: &WorkItemId) -> Result<WorkItemInfo, ApiFailure> {
        let url = self.api.endpoint(&self.root, &["workitems", id.as_str()]);
        self.api
            .send_json(Method::GET, url, Some(&*self.token), |r| r)
            .await
    }
}
