//! Versioned definition registry (bundles and activities share the same routes).

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde_json::json;

use super::ApiClient;
use crate::domain::{AliasInfo, ApiFailure, Definition, DefinitionVersion, QualifiedId, Token, Version};
use crate::ports::DefinitionRegistry;

pub struct HttpRegistry<D> {
    api: ApiClient,
    root: String,
    token: Arc<Token>,
    _definition: PhantomData<fn() -> D>,
}

impl<D: Definition> HttpRegistry<D> {
    pub fn new(api: ApiClient, root: impl Into<String>, token: Arc<Token>) -> Self {
        Self {
            api,
            root: root.into(),
            token,
            _definition: PhantomData,
        }
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut all = Vec::with_capacity(segments.len() + 1);
        all.push(D::COLLECTION);
        all.extend_from_slice(segments);
        self.api.endpoint(&self.root, &all)
    }
}

#[async_trait]
impl<D: Definition> DefinitionRegistry<D> for HttpRegistry<D> {
    async fn create(&self, definition: &D) -> Result<DefinitionVersion, ApiFailure> {
        self.api
            .send_json(Method::POST, self.url(&[]), Some(&*self.token), |r| {
                r.json(definition)
            })
            .await
    }

    async fn create_version(&self, definition: &D) -> Result<DefinitionVersion, ApiFailure> {
        let url = self.url(&[definition.id(), "versions"]);
        let body = definition
            .version_body()
            .map_err(|e| ApiFailure::transport("POST", url.as_str(), e.to_string()))?;
        self.api
            .send_json(Method::POST, url, Some(&*self.token), |r| r.json(&body))
            .await
    }

    async fn create_alias(
        &self,
        id: &str,
        alias: &str,
        version: Version,
    ) -> Result<AliasInfo, ApiFailure> {
        let body = json!({ "id": alias, "version": version });
        self.api
            .send_json(
                Method::POST,
                self.url(&[id, "aliases"]),
                Some(&*self.token),
                |r| r.json(&body),
            )
            .await
    }

    async fn update_alias(
        &self,
        id: &str,
        alias: &str,
        version: Version,
    ) -> Result<AliasInfo, ApiFailure> {
        let body = json!({ "version": version });
        self.api
            .send_json(
                Method::PATCH,
                self.url(&[id, "aliases", alias]),
                Some(&*self.token),
                |r| r.json(&body),
            )
            .await
    }

    async fn get_alias(&self, id: &str, alias: &str) -> Result<AliasInfo, ApiFailure> {
        self.api
            .send_json(
                Method::GET,
                self.url(&[id, "aliases", alias]),
                Some(&*self.token),
                |r| r,
            )
            .await
    }

    async fn get(&self, id: &QualifiedId) -> Result<DefinitionVersion, ApiFailure> {
        let full_id = id.to_string();
        self.api
            .send_json(Method::GET, self.url(&[&full_id]), Some(&*self.token), |r| r)
            .await
    }

    async fn delete(&self, id: &QualifiedId) -> Result<(), ApiFailure> {
        let full_id = id.to_string();
        self.api
            .send(Method::DELETE, self.url(&[&full_id]), Some(&*self.token), |r| r)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::domain::{ActivitySpec, BundleSpec};

    fn registry<D: Definition>() -> HttpRegistry<D> {
        let api = ApiClient::new(&EndpointConfig::default()).unwrap();
        HttpRegistry::new(api, "/da/us-east/v3", Arc::new(Token::new("t", None)))
    }

    #[test]
    fn routes_follow_the_collection() {
        let bundles = registry::<BundleSpec>();
        let activities = registry::<ActivitySpec>();

        assert_eq!(
            bundles.url(&["DxfBundle", "versions"]).path(),
            "/da/us-east/v3/appbundles/DxfBundle/versions"
        );
        assert_eq!(
            activities.url(&["ParametricDXF", "aliases", "prod"]).path(),
            "/da/us-east/v3/activities/ParametricDXF/aliases/prod"
        );
        let full = QualifiedId::new("abc", "ParametricDXF").to_string();
        assert_eq!(
            activities.url(&[&full]).path(),
            "/da/us-east/v3/activities/abc.ParametricDXF"
        );
    }

    #[test]
    fn parses_version_responses() {
        let created: DefinitionVersion = serde_json::from_str(
            r#"{"id":"DxfBundle","version":3,"engine":"Autodesk.Fusion+Latest","uploadParameters":{}}"#,
        )
        .unwrap();
        assert_eq!(created.version, 3);

        let alias: AliasInfo = serde_json::from_str(r#"{"id":"prod","version":3}"#).unwrap();
        assert_eq!(alias.version, 3);
    }
}
