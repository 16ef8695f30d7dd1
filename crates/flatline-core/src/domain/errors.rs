//! Errors - エラー型と分類
//!
//! # 分類
//! - Auth / Storage / Publish / Submission / Poll / Delete: リモート呼び出しの失敗（リトライしない）
//! - 409 (作成・alias) と 404 (削除) は成功として扱うのでここには現れない
//! - InvalidTransition / UnknownStatus: サービスの応答が状態機械に合わない
//! - Config / InvalidDimension / Io / Json: ローカル側の問題

use std::fmt;

use thiserror::Error;

use super::status::WorkItemStatus;
use super::version::Version;

pub type FlowResult<T> = Result<T, FlowError>;

/// Diagnostic detail of one failed remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    pub method: String,
    pub url: String,
    /// `None` when the request never got a response.
    pub status: Option<u16>,
    pub body: Option<String>,
    pub message: Option<String>,
}

impl ApiFailure {
    pub fn status(
        method: impl Into<String>,
        url: impl Into<String>,
        status: u16,
        body: Option<String>,
    ) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            status: Some(status),
            body: body.filter(|b| !b.is_empty()),
            message: None,
        }
    }

    pub fn transport(
        method: impl Into<String>,
        url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            status: None,
            body: None,
            message: Some(message.into()),
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.status == Some(409)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        if let Some(status) = self.status {
            write!(f, " -> {status}")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(body) = &self.body {
            write!(f, ": {body}")?;
        }
        Ok(())
    }
}

/// Step of a storage operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoragePhase {
    CreateContainer,
    Presign,
    Transfer,
    Finalize,
    PresignDownload,
    PresignUpload,
}

impl fmt::Display for StoragePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoragePhase::CreateContainer => "create-container",
            StoragePhase::Presign => "presign",
            StoragePhase::Transfer => "transfer",
            StoragePhase::Finalize => "finalize",
            StoragePhase::PresignDownload => "presign-download",
            StoragePhase::PresignUpload => "presign-upload",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("token request failed: {0}")]
    Auth(ApiFailure),

    #[error("storage {phase} failed: {failure}")]
    Storage {
        phase: StoragePhase,
        failure: ApiFailure,
    },

    #[error("publishing {kind} {id} failed: {failure}")]
    Publish {
        kind: &'static str,
        id: String,
        failure: ApiFailure,
    },

    #[error("alias {alias} resolves to version {actual}, expected {expected}")]
    AliasMismatch {
        alias: String,
        expected: Version,
        actual: Version,
    },

    #[error("looking up {what} failed: {failure}")]
    Lookup { what: String, failure: ApiFailure },

    #[error("work item submission failed: {0}")]
    Submission(ApiFailure),

    #[error("work item status read failed: {0}")]
    Poll(ApiFailure),

    #[error("delete failed: {0}")]
    Delete(ApiFailure),

    #[error("work item moved backwards: {from} -> {to}")]
    InvalidTransition {
        from: WorkItemStatus,
        to: WorkItemStatus,
    },

    #[error("unknown work item status {0:?}")]
    UnknownStatus(String),

    #[error("invalid dimension: {0}")]
    InvalidDimension(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowError {
    pub fn storage(phase: StoragePhase, failure: ApiFailure) -> Self {
        Self::Storage { phase, failure }
    }

    /// Remote call detail, when the error came from one.
    pub fn api_failure(&self) -> Option<&ApiFailure> {
        match self {
            FlowError::Auth(f)
            | FlowError::Submission(f)
            | FlowError::Poll(f)
            | FlowError::Delete(f)
            | FlowError::Storage { failure: f, .. }
            | FlowError::Publish { failure: f, .. }
            | FlowError::Lookup { failure: f, .. } => Some(f),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_display_carries_diagnostics() {
        let failure = ApiFailure::status(
            "POST",
            "https://host/oss/v2/buckets",
            400,
            Some("{\"reason\":\"bad key\"}".to_string()),
        );
        let err = FlowError::storage(StoragePhase::CreateContainer, failure);
        let msg = err.to_string();
        assert!(msg.contains("create-container"));
        assert!(msg.contains("POST https://host/oss/v2/buckets -> 400"));
        assert!(msg.contains("bad key"));
    }

    #[test]
    fn empty_body_is_dropped() {
        let failure = ApiFailure::status("GET", "u", 404, Some(String::new()));
        assert_eq!(failure.body, None);
        assert!(failure.is_not_found());
        assert!(!failure.is_conflict());
    }

    #[test]
    fn api_failure_is_reachable_from_error() {
        let err = FlowError::Poll(ApiFailure::transport("GET", "u", "connection reset"));
        let failure = err.api_failure().unwrap();
        assert_eq!(failure.status, None);
        assert!(err.to_string().contains("connection reset"));
        assert!(FlowError::Config("x".into()).api_failure().is_none());
    }
}
