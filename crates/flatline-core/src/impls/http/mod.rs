//! HTTP implementations of the ports (the real REST service).
//!
//! Every call goes through `ApiClient`, which turns a non-2xx response into an
//! `ApiFailure` carrying method, URL, status and body. No call is retried.

mod auth;
mod registry;
mod storage;
mod work_items;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{EndpointConfig, FlowConfig};
use crate::domain::{ApiFailure, Credentials, FlowError, FlowResult, Scopes, Token};
use crate::ports::{Backend, Connection, TokenProvider};

pub use self::auth::HttpTokenProvider;
pub use self::registry::HttpRegistry;
pub use self::storage::HttpObjectStore;
pub use self::work_items::HttpWorkItems;

/// Shared reqwest client plus the service base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(endpoints: &EndpointConfig) -> FlowResult<Self> {
        let base = Url::parse(&endpoints.base_url)
            .map_err(|e| FlowError::Config(format!("endpoints.base_url: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(FlowError::Config(format!(
                "endpoints.base_url {base} cannot carry a path"
            )));
        }
        let client = Client::builder()
            .timeout(endpoints.timeout())
            .build()
            .map_err(|e| FlowError::Config(format!("http client: {e}")))?;
        Ok(Self { client, base })
    }

    /// `base` + `root` (e.g. `/oss/v2`) + percent-encoded `segments`.
    pub fn endpoint(&self, root: &str, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(root.split('/').filter(|s| !s.is_empty()));
            path.extend(segments);
        }
        url
    }

    /// Send and fail on any non-2xx status.
    async fn send(
        &self,
        method: Method,
        url: Url,
        token: Option<&Token>,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response, ApiFailure> {
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&token.bearer()).map_err(|e| {
                ApiFailure::transport(method.as_str(), url.as_str(), format!("bad token: {e}"))
            })?;
            value.set_sensitive(true);
            request = request.header(AUTHORIZATION, value);
        }

        let response = build(request)
            .send()
            .await
            .map_err(|e| ApiFailure::transport(method.as_str(), url.as_str(), e.to_string()))?;

        let status = response.status();
        debug!(method = %method, url = %url, status = status.as_u16(), "response");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.ok();
        Err(ApiFailure::status(
            method.as_str(),
            url.as_str(),
            status.as_u16(),
            body,
        ))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        token: Option<&Token>,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<T, ApiFailure> {
        let response = self
            .send(method.clone(), url.clone(), token, build)
            .await?;
        response.json().await.map_err(|e| {
            ApiFailure::transport(
                method.as_str(),
                url.as_str(),
                format!("unexpected response body: {e}"),
            )
        })
    }
}

/// Backend for the real service: one `ApiClient` shared by every port.
pub struct HttpBackend {
    api: ApiClient,
    endpoints: EndpointConfig,
    bucket_key: String,
    tokens: HttpTokenProvider,
}

impl HttpBackend {
    pub fn new(config: &FlowConfig) -> FlowResult<Self> {
        let api = ApiClient::new(&config.endpoints)?;
        Ok(Self {
            tokens: HttpTokenProvider::new(api.clone(), &config.endpoints.auth_path),
            api,
            endpoints: config.endpoints.clone(),
            bucket_key: config.storage.bucket_key.clone(),
        })
    }
}

#[async_trait]
impl TokenProvider for HttpBackend {
    async fn acquire(&self, credentials: &Credentials, scopes: &Scopes) -> FlowResult<Token> {
        self.tokens.acquire(credentials, scopes).await
    }
}

impl Backend for HttpBackend {
    fn connect(&self, token: Arc<Token>) -> Connection {
        let automation = &self.endpoints.automation_path;
        Connection {
            objects: Arc::new(HttpObjectStore::new(
                self.api.clone(),
                &self.endpoints.storage_path,
                &self.bucket_key,
                token.clone(),
            )),
            bundles: Arc::new(HttpRegistry::new(self.api.clone(), automation, token.clone())),
            activities: Arc::new(HttpRegistry::new(
                self.api.clone(),
                automation,
                token.clone(),
            )),
            work_items: Arc::new(HttpWorkItems::new(self.api.clone(), automation, token)),
        }
    }
}
