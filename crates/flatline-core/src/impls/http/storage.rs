//! Object storage over presigned S3 URLs.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ApiClient;
use crate::domain::{ApiFailure, Token, UploadKey};
use crate::ports::{ObjectStore, UploadTarget};

/// Output URLs have to outlive the whole polling window.
const OUTPUT_URL_MINUTES: u32 = 60;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedUpload {
    upload_key: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    urls: Vec<String>,
}

impl SignedUpload {
    fn into_target(self) -> UploadTarget {
        let mut urls = self.urls;
        if let Some(url) = self.url {
            urls.insert(0, url);
        }
        UploadTarget {
            upload_key: UploadKey::new(self.upload_key),
            urls,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignedDownload {
    url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteUpload<'a> {
    upload_key: &'a str,
}

pub struct HttpObjectStore {
    api: ApiClient,
    root: String,
    bucket_key: String,
    token: Arc<Token>,
}

impl HttpObjectStore {
    pub fn new(
        api: ApiClient,
        root: impl Into<String>,
        bucket_key: impl Into<String>,
        token: Arc<Token>,
    ) -> Self {
        Self {
            api,
            root: root.into(),
            bucket_key: bucket_key.into(),
            token,
        }
    }

    fn object_url(&self, object_key: &str, action: &str) -> Url {
        self.api.endpoint(
            &self.root,
            &["buckets", &self.bucket_key, "objects", object_key, action],
        )
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn bucket_key(&self) -> &str {
        &self.bucket_key
    }

    async fn create_bucket(&self, policy_key: &str) -> Result<(), ApiFailure> {
        let url = self.api.endpoint(&self.root, &["buckets"]);
        let body = json!({ "bucketKey": self.bucket_key, "policyKey": policy_key });
        self.api
            .send(Method::POST, url, Some(&*self.token), |r| r.json(&body))
            .await?;
        Ok(())
    }

    async fn request_upload(
        &self,
        object_key: &str,
        content_length: u64,
    ) -> Result<UploadTarget, ApiFailure> {
        let url = self.object_url(object_key, "signeds3upload");
        let signed: SignedUpload = self
            .api
            .send_json(Method::GET, url, Some(&*self.token), |r| {
                r.query(&[("partNumbers", 1), ("contentLength", content_length)])
            })
            .await?;
        Ok(signed.into_target())
    }

    async fn put_bytes(&self, url: &str, body: Bytes) -> Result<(), ApiFailure> {
        let url = Url::parse(url)
            .map_err(|e| ApiFailure::transport("PUT", url, format!("invalid presigned url: {e}")))?;
        self.api
            .send(Method::PUT, url, None, |r| {
                r.header(CONTENT_TYPE, "application/octet-stream").body(body)
            })
            .await?;
        Ok(())
    }

    async fn complete_upload(
        &self,
        object_key: &str,
        upload_key: &UploadKey,
    ) -> Result<(), ApiFailure> {
        let url = self.object_url(object_key, "signeds3upload");
        let body = CompleteUpload {
            upload_key: upload_key.as_str(),
        };
        self.api
            .send(Method::POST, url, Some(&*self.token), |r| r.json(&body))
            .await?;
        Ok(())
    }

    async fn signed_download(&self, object_key: &str) -> Result<String, ApiFailure> {
        let url = self.object_url(object_key, "signeds3download");
        let signed: SignedDownload = self
            .api
            .send_json(Method::GET, url, Some(&*self.token), |r| r)
            .await?;
        Ok(signed.url)
    }

    async fn signed_upload(&self, object_key: &str) -> Result<String, ApiFailure> {
        let url = self.object_url(object_key, "signeds3upload");
        let method = Method::GET;
        let signed: SignedUpload = self
            .api
            .send_json(method.clone(), url.clone(), Some(&*self.token), |r| {
                r.query(&[("minutesExpiration", OUTPUT_URL_MINUTES)])
            })
            .await?;
        signed
            .into_target()
            .url()
            .map(str::to_string)
            .ok_or_else(|| {
                ApiFailure::transport(method.as_str(), url.as_str(), "response carried no url")
            })
    }
}
