//! Work item request and its argument bindings.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::credentials::Token;
use super::definition::Verb;
use super::version::VersionRef;

/// Concrete value bound to one declared parameter.
///
/// Inputs point at a storage URN and carry the auth header the job side uses
/// to read it. Outputs point at a presigned upload URL and carry nothing.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    pub verb: Verb,
}

impl Argument {
    pub fn read(urn: impl Into<String>, token: &Token) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), token.bearer());
        Self {
            url: urn.into(),
            headers,
            verb: Verb::Get,
        }
    }

    pub fn write(presigned_url: impl Into<String>) -> Self {
        Self {
            url: presigned_url.into(),
            headers: BTreeMap::new(),
            verb: Verb::Put,
        }
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.keys().map(String::as_str).collect();
        f.debug_struct("Argument")
            .field("url", &self.url)
            .field("headers", &header_names)
            .field("verb", &self.verb)
            .finish()
    }
}

/// Body of `POST /workitems`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemRequest {
    pub activity_id: String,
    pub arguments: BTreeMap<String, Argument>,
}

impl WorkItemRequest {
    pub fn new(activity: &VersionRef) -> Self {
        Self {
            activity_id: activity.to_string(),
            arguments: BTreeMap::new(),
        }
    }

    pub fn bind(mut self, name: impl Into<String>, argument: Argument) -> Self {
        self.arguments.insert(name.into(), argument);
        self
    }
}
