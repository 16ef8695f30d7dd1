//! ObjectStore port - Blob ストレージ（リモートの生の呼び出し）
//!
//! ここは 1 呼び出し = 1 メソッドの薄い層です。409 を成功とみなす、
//! フェーズ名を付けてエラーにする、などの意味付けは `app::storage` が行います。
//!
//! # アップロードの流れ
//! 1. `request_upload`: サイズを指定して presigned URL と upload key を取得
//! 2. `put_bytes`: URL に生のバイト列を PUT
//! 3. `complete_upload`: upload key で確定（ここで初めて object key が解決可能になる）

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{ApiFailure, UploadKey};

/// Presigned target returned by the first upload phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub upload_key: UploadKey,
    pub urls: Vec<String>,
}

impl UploadTarget {
    /// Single-part uploads only ever use the first URL.
    pub fn url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }
}

/// ObjectStore は 1 つの bucket に対する操作を提供
///
/// # 設計原則
/// - bucket key は実装の構築時に固定
/// - エラーは `ApiFailure`（status / body / method / url）をそのまま返す
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket_key(&self) -> &str;

    /// URN the job service uses to read an object with a bearer token.
    fn object_urn(&self, object_key: &str) -> String {
        format!("urn:adsk.objects:os.object:{}/{}", self.bucket_key(), object_key)
    }

    async fn create_bucket(&self, policy_key: &str) -> Result<(), ApiFailure>;

    async fn request_upload(
        &self,
        object_key: &str,
        content_length: u64,
    ) -> Result<UploadTarget, ApiFailure>;

    async fn put_bytes(&self, url: &str, body: Bytes) -> Result<(), ApiFailure>;

    async fn complete_upload(
        &self,
        object_key: &str,
        upload_key: &UploadKey,
    ) -> Result<(), ApiFailure>;

    /// Time-limited URL to GET the object without a token.
    async fn signed_download(&self, object_key: &str) -> Result<String, ApiFailure>;

    /// Time-limited URL the job side can PUT an output to without a token.
    async fn signed_upload(&self, object_key: &str) -> Result<String, ApiFailure>;
}

#[async_trait]
impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    fn bucket_key(&self) -> &str {
        (**self).bucket_key()
    }

    fn object_urn(&self, object_key: &str) -> String {
        (**self).object_urn(object_key)
    }

    async fn create_bucket(&self, policy_key: &str) -> Result<(), ApiFailure> {
        (**self).create_bucket(policy_key).await
    }

    async fn request_upload(
        &self,
        object_key: &str,
        content_length: u64,
    ) -> Result<UploadTarget, ApiFailure> {
        (**self).request_upload(object_key, content_length).await
    }

    async fn put_bytes(&self, url: &str, body: Bytes) -> Result<(), ApiFailure> {
        (**self).put_bytes(url, body).await
    }

    async fn complete_upload(
        &self,
        object_key: &str,
        upload_key: &UploadKey,
    ) -> Result<(), ApiFailure> {
        (**self).complete_upload(object_key, upload_key).await
    }

    async fn signed_download(&self, object_key: &str) -> Result<String, ApiFailure> {
        (**self).signed_download(object_key).await
    }

    async fn signed_upload(&self, object_key: &str) -> Result<String, ApiFailure> {
        (**self).signed_upload(object_key).await
    }
}
