//! Client-credentials token exchange.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::ApiClient;
use crate::domain::{Credentials, FlowError, FlowResult, Scopes, Token};
use crate::ports::TokenProvider;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// `POST {auth_path}` with basic auth and a form body.
pub struct HttpTokenProvider {
    api: ApiClient,
    auth_path: String,
}

impl HttpTokenProvider {
    pub fn new(api: ApiClient, auth_path: impl Into<String>) -> Self {
        Self {
            api,
            auth_path: auth_path.into(),
        }
    }
}

fn token_form(scopes: &Scopes) -> [(&'static str, String); 2] {
    [
        ("grant_type", "client_credentials".to_string()),
        ("scope", scopes.to_string()),
    ]
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn acquire(&self, credentials: &Credentials, scopes: &Scopes) -> FlowResult<Token> {
        let url = self.api.endpoint(&self.auth_path, &[]);
        let form = token_form(scopes);
        let response: TokenResponse = self
            .api
            .send_json(Method::POST, url, None, |request| {
                request
                    .basic_auth(&credentials.client_id, Some(credentials.client_secret()))
                    .form(&form)
            })
            .await
            .map_err(FlowError::Auth)?;

        debug!(expires_in = ?response.expires_in, "token issued");
        Ok(Token::new(
            response.access_token,
            response.expires_in.map(Duration::from_secs),
        ))
    }
}
