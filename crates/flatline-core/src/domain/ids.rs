//! Domain identifiers (strongly-typed IDs).
//!
//! リモートサービスが払い出す ID は不透明な文字列なので、`Id<T>` は
//! String を包み、Phantom type でコンパイル時に種類を区別します。
//! 実行ごとの ID（RunId）だけはこちらで生成するので ULID を使います。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// ログやエラーで使う種類名（例: "work item"）
    fn kind() -> &'static str;
}

/// Opaque identifier handed out by the remote service.
///
/// `T` is a marker only; `WorkItemId` and `UploadKey` cannot be mixed up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> &'static str {
        T::kind()
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Work item のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkItem {}

impl IdMarker for WorkItem {
    fn kind() -> &'static str {
        "work item"
    }
}

/// Upload session のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Upload {}

impl IdMarker for Upload {
    fn kind() -> &'static str {
        "upload"
    }
}

/// Identifier of one submitted work item.
pub type WorkItemId = Id<WorkItem>;

/// Key returned by the presign step, required to finalize an upload.
pub type UploadKey = Id<Upload>;

/// Identifier of one local execution run.
///
/// Used as the prefix of every output object key so concurrent runs never
/// write to the same key. The leading 48 bits of a ULID are the millisecond
/// timestamp, the rest is random.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Ulid);

impl RunId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Millisecond timestamp the id was minted at.
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }

    /// Object key for an output file produced during this run.
    pub fn output_key(&self, local_name: &str) -> String {
        format!("{}_{}", self.0.to_string().to_lowercase(), local_name)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_keep_their_value_and_kind() {
        let work_item = WorkItemId::new("a1b2c3");
        let upload = UploadKey::new("a1b2c3");

        assert_eq!(work_item.as_str(), upload.as_str());
        assert_eq!(work_item.kind(), "work item");
        assert_eq!(upload.kind(), "upload");
        // let _: WorkItemId = upload; // <- does not compile
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = WorkItemId::new("7f1e");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"7f1e\"");

        let back: WorkItemId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn output_keys_are_prefixed_by_run() {
        let ulid = Ulid::from_parts(1_700_000_000_000, 42);
        let run = RunId::from_ulid(ulid);

        let key = run.output_key("Top_flat.dxf");
        assert!(key.ends_with("_Top_flat.dxf"));
        assert!(key.starts_with(&ulid.to_string().to_lowercase()));
        assert_eq!(run.timestamp_ms(), 1_700_000_000_000);
    }

    #[test]
    fn runs_in_the_same_millisecond_get_distinct_keys() {
        let a = RunId::from_ulid(Ulid::from_parts(1_700_000_000_000, 1));
        let b = RunId::from_ulid(Ulid::from_parts(1_700_000_000_000, 2));
        assert_ne!(a.output_key("report.txt"), b.output_key("report.txt"));
    }
}
