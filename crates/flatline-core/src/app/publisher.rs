//! Publisher: registers versioned definitions and keeps an alias on the latest.
//!
//! One implementation serves bundles and activities alike; the collection and
//! wire body come from the `Definition` impl.

use std::marker::PhantomData;

use tracing::{info, warn};

use super::upsert::{Upserted, idempotent_upsert};
use crate::domain::{
    ApiFailure, Definition, DefinitionVersion, FlowError, FlowResult, QualifiedId, Version,
    VersionRef,
};
use crate::ports::DefinitionRegistry;

/// What the caller wants from the alias step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasIntent {
    /// Any existing alias is fine, wherever it points.
    EnsureExists,
    /// The alias must resolve to the given version afterwards.
    PointAt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasOutcome {
    Created { version: Version },
    /// Existed and was moved to `version` (verified by reading it back).
    Repointed { version: Version },
    /// Existed and was left alone (`EnsureExists` only).
    Existing,
}

/// Result of one `publish` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub id: QualifiedId,
    pub version: Version,
    /// `false` when an existing id got a new version.
    pub created: bool,
    pub alias: AliasOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Deleted,
    AlreadyAbsent,
}

pub struct Publisher<D, R> {
    registry: R,
    owner: String,
    _definition: PhantomData<fn() -> D>,
}

impl<D, R> Publisher<D, R>
where
    D: Definition,
    R: DefinitionRegistry<D>,
{
    /// `owner` is the prefix of fully-qualified ids (the client id).
    pub fn new(registry: R, owner: impl Into<String>) -> Self {
        Self {
            registry,
            owner: owner.into(),
            _definition: PhantomData,
        }
    }

    pub fn qualified(&self, short_id: &str) -> QualifiedId {
        QualifiedId::new(&self.owner, short_id)
    }

    fn publish_error(&self, id: &str, failure: ApiFailure) -> FlowError {
        FlowError::Publish {
            kind: D::KIND,
            id: id.to_string(),
            failure,
        }
    }

    /// Create `definition`, or mint a new version if the id is taken.
    pub async fn upsert(&self, definition: &D) -> FlowResult<Upserted<DefinitionVersion>> {
        let id = definition.id();
        let upserted = idempotent_upsert(
            || self.registry.create(definition),
            || {
                info!(kind = D::KIND, id, "already registered, minting a new version");
                self.registry.create_version(definition)
            },
            ApiFailure::is_conflict,
        )
        .await
        .map_err(|failure| self.publish_error(id, failure))?;

        match &upserted {
            Upserted::Created(v) => info!(kind = D::KIND, id, version = v.version, "created"),
            Upserted::Versioned(v) => info!(kind = D::KIND, id, version = v.version, "versioned"),
        }
        Ok(upserted)
    }

    /// Make `alias` exist, and with `PointAt` make it resolve to `version`.
    pub async fn point_alias(
        &self,
        id: &str,
        alias: &str,
        version: Version,
        intent: AliasIntent,
    ) -> FlowResult<AliasOutcome> {
        match self.registry.create_alias(id, alias, version).await {
            Ok(info) => {
                info!(kind = D::KIND, id, alias, version = info.version, "alias created");
                return Ok(AliasOutcome::Created {
                    version: info.version,
                });
            }
            Err(failure) if failure.is_conflict() => {}
            Err(failure) => return Err(self.publish_error(id, failure)),
        }

        if intent == AliasIntent::EnsureExists {
            info!(kind = D::KIND, id, alias, "alias already exists");
            return Ok(AliasOutcome::Existing);
        }

        self.registry
            .update_alias(id, alias, version)
            .await
            .map_err(|failure| self.publish_error(id, failure))?;

        let resolved = self
            .registry
            .get_alias(id, alias)
            .await
            .map_err(|failure| self.publish_error(id, failure))?;
        if resolved.version != version {
            warn!(kind = D::KIND, id, alias, expected = version, actual = resolved.version, "alias did not move");
            return Err(FlowError::AliasMismatch {
                alias: format!("{id}+{alias}"),
                expected: version,
                actual: resolved.version,
            });
        }

        info!(kind = D::KIND, id, alias, version, "alias repointed");
        Ok(AliasOutcome::Repointed { version })
    }

    /// Upsert, then point `alias` at the resulting version.
    pub async fn publish(
        &self,
        definition: &D,
        alias: &str,
        intent: AliasIntent,
    ) -> FlowResult<Publication> {
        let upserted = self.upsert(definition).await?;
        let created = upserted.was_created();
        let version = upserted.into_inner().version;
        let alias = self
            .point_alias(definition.id(), alias, version, intent)
            .await?;

        Ok(Publication {
            id: self.qualified(definition.id()),
            version,
            created,
            alias,
        })
    }

    /// Latest registered version, as a reference usable in a submission.
    pub async fn current_version(&self, short_id: &str) -> FlowResult<VersionRef> {
        let id = self.qualified(short_id);
        let latest = self
            .registry
            .get(&id)
            .await
            .map_err(|failure| FlowError::Lookup {
                what: format!("{} {id}", D::KIND),
                failure,
            })?;
        info!(kind = D::KIND, %id, version = latest.version, "resolved latest version");
        Ok(id.at_version(latest.version))
    }

    /// Delete every version. A 404 means it is already gone.
    pub async fn delete(&self, short_id: &str) -> FlowResult<Deletion> {
        let id = self.qualified(short_id);
        match self.registry.delete(&id).await {
            Ok(()) => {
                info!(kind = D::KIND, %id, "deleted");
                Ok(Deletion::Deleted)
            }
            Err(failure) if failure.is_not_found() => {
                info!(kind = D::KIND, %id, "not found, nothing to delete");
                Ok(Deletion::AlreadyAbsent)
            }
            Err(failure) => Err(FlowError::Delete(failure)),
        }
    }
}
