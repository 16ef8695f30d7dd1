//! DefinitionRegistry port - バージョン付き定義（bundle / activity）の登録先
//!
//! 409 の解釈（新バージョンを作る、alias を付け替える）は
//! `app::upsert` と `app::publisher` の責務で、ここは生の呼び出しだけです。

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{AliasInfo, ApiFailure, Definition, DefinitionVersion, QualifiedId, Version};

/// DefinitionRegistry は `D` のコレクションに対する操作を提供
///
/// - 作成系（create / create_version / alias）は short id を使う
/// - 参照・削除は `<owner>.<id>` の完全修飾 id を使う
#[async_trait]
pub trait DefinitionRegistry<D: Definition>: Send + Sync {
    /// `POST /{collection}`; 409 if the id is taken.
    async fn create(&self, definition: &D) -> Result<DefinitionVersion, ApiFailure>;

    /// `POST /{collection}/{id}/versions`; always mints a new version.
    async fn create_version(&self, definition: &D) -> Result<DefinitionVersion, ApiFailure>;

    /// `POST /{collection}/{id}/aliases`; 409 if the alias exists.
    async fn create_alias(
        &self,
        id: &str,
        alias: &str,
        version: Version,
    ) -> Result<AliasInfo, ApiFailure>;

    /// `PATCH /{collection}/{id}/aliases/{alias}`
    async fn update_alias(
        &self,
        id: &str,
        alias: &str,
        version: Version,
    ) -> Result<AliasInfo, ApiFailure>;

    /// `GET /{collection}/{id}/aliases/{alias}`
    async fn get_alias(&self, id: &str, alias: &str) -> Result<AliasInfo, ApiFailure>;

    /// `GET /{collection}/{owner.id}`: the latest version.
    async fn get(&self, id: &QualifiedId) -> Result<DefinitionVersion, ApiFailure>;

    /// `DELETE /{collection}/{owner.id}`; 404 if already gone.
    async fn delete(&self, id: &QualifiedId) -> Result<(), ApiFailure>;
}

#[async_trait]
impl<D, R> DefinitionRegistry<D> for Arc<R>
where
    D: Definition,
    R: DefinitionRegistry<D> + ?Sized,
{
    async fn create(&self, definition: &D) -> Result<DefinitionVersion, ApiFailure> {
        (**self).create(definition).await
    }

    async fn create_version(&self, definition: &D) -> Result<DefinitionVersion, ApiFailure> {
        (**self).create_version(definition).await
    }

    async fn create_alias(
        &self,
        id: &str,
        alias: &str,
        version: Version,
    ) -> Result<AliasInfo, ApiFailure> {
        (**self).create_alias(id, alias, version).await
    }

    async fn update_alias(
        &self,
        id: &str,
        alias: &str,
        version: Version,
    ) -> Result<AliasInfo, ApiFailure> {
        (**self).update_alias(id, alias, version).await
    }

    async fn get_alias(&self, id: &str, alias: &str) -> Result<AliasInfo, ApiFailure> {
        (**self).get_alias(id, alias).await
    }

    async fn get(&self, id: &QualifiedId) -> Result<DefinitionVersion, ApiFailure> {
        (**self).get(id).await
    }

    async fn delete(&self, id: &QualifiedId) -> Result<(), ApiFailure> {
        (**self).delete(id).await
    }
}
