//! Definitions registered with the job service: bundles and activities.
//!
//! Both are versioned the same way, so the registry and the publisher are
//! written once against the `Definition` trait.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Definition は登録先コレクションと型を対応付ける
///
/// # 使用例
/// ```ignore
/// impl Definition for BundleSpec {
///     const COLLECTION: &'static str = "appbundles";
///     const KIND: &'static str = "bundle";
///     fn id(&self) -> &str { &self.id }
/// }
/// ```
pub trait Definition: Serialize + Send + Sync + 'static {
    /// URL path segment of the collection (`appbundles`, `activities`).
    const COLLECTION: &'static str;

    /// Human-readable name for logs and errors.
    const KIND: &'static str;

    /// Short (unqualified) id.
    fn id(&self) -> &str;

    /// Body for `POST /{collection}/{id}/versions`: the create body minus `id`.
    fn version_body(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut body = serde_json::to_value(self)?;
        if let Some(map) = body.as_object_mut() {
            map.remove("id");
        }
        Ok(body)
    }
}

/// Packaged automation payload (a zip already uploaded to storage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSpec {
    pub id: String,
    pub engine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub zip_file_urn: String,
}

impl Definition for BundleSpec {
    const COLLECTION: &'static str = "appbundles";
    const KIND: &'static str = "bundle";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Direction of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    /// Read-only input, downloaded before the job starts.
    Get,
    /// Write-only output, uploaded after the job finishes.
    Put,
}

impl Verb {
    pub fn is_output(self) -> bool {
        matches!(self, Verb::Put)
    }
}

/// One declared input or output of an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    /// File name the job sees in its working directory.
    pub local_name: String,
    pub verb: Verb,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterSpec {
    pub fn input(local_name: impl Into<String>) -> Self {
        Self {
            local_name: local_name.into(),
            verb: Verb::Get,
            description: None,
        }
    }

    pub fn output(local_name: impl Into<String>) -> Self {
        Self {
            local_name: local_name.into(),
            verb: Verb::Put,
            description: None,
        }
    }
}

/// Job template: command line, bundle references and declared parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySpec {
    pub id: String,
    pub engine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub command_line: Vec<String>,
    pub appbundles: Vec<String>,
    pub parameters: BTreeMap<String, ParameterSpec>,
}

impl ActivitySpec {
    pub fn inputs(&self) -> impl Iterator<Item = (&str, &ParameterSpec)> {
        self.parameters
            .iter()
            .filter(|(_, p)| !p.verb.is_output())
            .map(|(name, p)| (name.as_str(), p))
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, &ParameterSpec)> {
        self.parameters
            .iter()
            .filter(|(_, p)| p.verb.is_output())
            .map(|(name, p)| (name.as_str(), p))
    }
}

impl Definition for ActivitySpec {
    const COLLECTION: &'static str = "activities";
    const KIND: &'static str = "activity";

    fn id(&self) -> &str {
        &self.id
    }
}
