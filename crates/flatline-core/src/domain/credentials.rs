//! Service-account credentials, scopes and bearer tokens.

use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

/// Client id + secret of the service account. Input only, never persisted.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    #[serde(deserialize_with = "deserialize_secret")]
    client_secret: SecretString,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
        }
    }

    pub fn client_secret(&self) -> &str {
        self.client_secret.expose_secret()
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

/// Scope set requested with a token.
///
/// Has to be the union of everything the run will touch: a narrower set that
/// hits a 403 downstream is a configuration bug, not something to retry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Scopes(Vec<String>);

impl Scopes {
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Scopes(Vec::new());
        for scope in scopes {
            out.insert(scope.into());
        }
        out
    }

    pub fn insert(&mut self, scope: String) {
        if !self.0.contains(&scope) {
            self.0.push(scope);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Scopes {
    /// Storage read/write, container create/read and full job-service access.
    fn default() -> Self {
        Scopes::new([
            "data:read",
            "data:write",
            "bucket:create",
            "bucket:read",
            "code:all",
        ])
    }
}

impl fmt::Display for Scopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// Short-lived bearer token. Fetched fresh for every run.
pub struct Token {
    value: SecretString,
    expires_in: Option<Duration>,
}

impl Token {
    pub fn new(value: impl Into<String>, expires_in: Option<Duration>) -> Self {
        Self {
            value: SecretString::from(value.into()),
            expires_in,
        }
    }

    /// Value of an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value.expose_secret())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}
