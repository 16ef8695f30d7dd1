//! Storage client: container and upload semantics on top of `ObjectStore`.

use std::path::Path;

use bytes::Bytes;
use tracing::{debug, info};

use crate::domain::{ApiFailure, FlowError, FlowResult, StoragePhase};
use crate::ports::ObjectStore;

/// Result of `ensure_container`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerOutcome {
    Created,
    AlreadyExists,
}

/// An object whose upload has been finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub object_key: String,
    pub urn: String,
    pub size: u64,
}

pub struct StorageClient<S> {
    store: S,
}

impl<S: ObjectStore> StorageClient<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn object_urn(&self, object_key: &str) -> String {
        self.store.object_urn(object_key)
    }

    /// Create the persistent container. An existing container (409) is success.
    pub async fn ensure_container(&self, policy_key: &str) -> FlowResult<ContainerOutcome> {
        let bucket = self.store.bucket_key();
        match self.store.create_bucket(policy_key).await {
            Ok(()) => {
                info!(bucket, policy_key, "bucket created");
                Ok(ContainerOutcome::Created)
            }
            Err(failure) if failure.is_conflict() => {
                info!(bucket, "bucket already exists");
                Ok(ContainerOutcome::AlreadyExists)
            }
            Err(failure) => Err(FlowError::storage(StoragePhase::CreateContainer, failure)),
        }
    }

    /// Upload a local file under `object_key`.
    ///
    /// Three phases: presign for the file's byte length, PUT the bytes, then
    /// finalize. The key only resolves once finalize succeeds, so a failure
    /// half way leaves nothing to clean up.
    pub async fn upload(
        &self,
        local_file: impl AsRef<Path>,
        object_key: &str,
    ) -> FlowResult<UploadedObject> {
        let local_file = local_file.as_ref();
        let bytes = Bytes::from(tokio::fs::read(local_file).await?);
        self.upload_bytes(bytes, object_key).await
    }

    pub async fn upload_bytes(&self, bytes: Bytes, object_key: &str) -> FlowResult<UploadedObject> {
        let size = bytes.len() as u64;

        let target = self
            .store
            .request_upload(object_key, size)
            .await
            .map_err(|f| FlowError::storage(StoragePhase::Presign, f))?;
        let url = target.url().ok_or_else(|| {
            FlowError::storage(
                StoragePhase::Presign,
                ApiFailure::transport("GET", object_key, "presign response carried no upload url"),
            )
        })?;
        debug!(object_key, size, "presigned upload target acquired");

        self.store
            .put_bytes(url, bytes)
            .await
            .map_err(|f| FlowError::storage(StoragePhase::Transfer, f))?;

        self.store
            .complete_upload(object_key, &target.upload_key)
            .await
            .map_err(|f| FlowError::storage(StoragePhase::Finalize, f))?;

        info!(object_key, size, "uploaded");
        Ok(UploadedObject {
            object_key: object_key.to_string(),
            urn: self.store.object_urn(object_key),
            size,
        })
    }

    pub async fn presign_get(&self, object_key: &str) -> FlowResult<String> {
        self.store
            .signed_download(object_key)
            .await
            .map_err(|f| FlowError::storage(StoragePhase::PresignDownload, f))
    }

    pub async fn presign_put(&self, object_key: &str) -> FlowResult<String> {
        self.store
            .signed_upload(object_key)
            .await
            .map_err(|f| FlowError::storage(StoragePhase::PresignUpload, f))
    }
}
