//! Fully-qualified ids, versions and aliases of registered definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Monotonic version number minted by the remote registry.
pub type Version = u32;

/// `<owner>.<name>`, the form the remote service uses to address a
/// definition outside of its own creation calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedId {
    owner: String,
    name: String,
}

impl QualifiedId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn at_version(&self, version: Version) -> VersionRef {
        VersionRef {
            id: self.clone(),
            label: Label::Version(version),
        }
    }

    pub fn at_alias(&self, alias: impl Into<String>) -> VersionRef {
        VersionRef {
            id: self.clone(),
            label: Label::Alias(alias.into()),
        }
    }
}

impl fmt::Display for QualifiedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

/// What follows the `+` in a version reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    Version(Version),
    Alias(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Version(v) => write!(f, "{v}"),
            Label::Alias(a) => f.write_str(a),
        }
    }
}

/// `<owner>.<name>+<version|alias>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRef {
    pub id: QualifiedId,
    pub label: Label,
}

impl fmt::Display for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.id, self.label)
    }
}

/// One registered version, as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionVersion {
    pub id: String,
    pub version: Version,
}

/// An alias and the version it currently resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasInfo {
    pub id: String,
    pub version: Version,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_render_like_the_service_expects() {
        let id = QualifiedId::new("AbCdClient", "ParametricDXF");
        assert_eq!(id.to_string(), "AbCdClient.ParametricDXF");
        assert_eq!(id.at_version(7).to_string(), "AbCdClient.ParametricDXF+7");
        assert_eq!(id.at_alias("prod").to_string(), "AbCdClient.ParametricDXF+prod");
    }
}
