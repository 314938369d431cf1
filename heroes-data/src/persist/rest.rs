//! Redis-over-REST client (the protocol spoken by Upstash and Vercel KV).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{KvStore, PersistError};

const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Location and credentials of the key/value service.
#[derive(Clone, PartialEq, Eq)]
pub struct KvDetails {
    /// Base URL of the REST endpoint.
    pub url: String,
    /// Bearer token authorising writes.
    pub token: String,
}

impl std::fmt::Debug for KvDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvDetails")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl KvDetails {
    /// Describe the service at `url`, authorised by `token`.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Value,
    error: Option<String>,
}

/// [`KvStore`] that sends each command as a JSON array in a `POST` body.
#[derive(Debug, Clone)]
pub struct RestKvStore {
    client: Client,
    details: KvDetails,
}

impl RestKvStore {
    /// Construct a client for the service described by `details`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::MissingToken`] when the token is blank and
    /// [`PersistError::Client`] when the HTTP client cannot be built.
    pub fn new(details: KvDetails) -> Result<Self, PersistError> {
        if details.token.trim().is_empty() {
            return Err(PersistError::MissingToken { url: details.url });
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(PersistError::Client)?;
        Ok(Self { client, details })
    }

    async fn command(&self, name: &'static str, args: Vec<Value>) -> Result<Value, PersistError> {
        let url = self.details.url.as_str();
        let mut body = Vec::with_capacity(args.len() + 1);
        body.push(Value::from(name));
        body.extend(args);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.details.token)
            .json(&body)
            .send()
            .await
            .map_err(|err| convert_reqwest_error(err, url))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| convert_reqwest_error(err, url))?;
        let envelope: Option<Envelope> = serde_json::from_str(&text).ok();
        match envelope {
            Some(Envelope {
                error: Some(message),
                ..
            }) => Err(PersistError::Command {
                command: name,
                message,
            }),
            _ if !status.is_success() => Err(PersistError::Http {
                url: url.to_owned(),
                status: status.as_u16(),
                message: text,
            }),
            Some(Envelope { result, .. }) => Ok(result),
            None => Err(PersistError::Response {
                command: name,
                message: format!("body is not a result envelope: {text}"),
            }),
        }
    }
}

fn strings(command: &'static str, value: Value) -> Result<Vec<Option<String>>, PersistError> {
    let Value::Array(items) = value else {
        return Err(PersistError::Response {
            command,
            message: format!("expected an array, received {value}"),
        });
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Null => Ok(None),
            Value::String(text) => Ok(Some(text)),
            other => Err(PersistError::Response {
                command,
                message: format!("expected a string or null, received {other}"),
            }),
        })
        .collect()
}

#[async_trait(?Send)]
impl KvStore for RestKvStore {
    async fn hset(&self, name: &str, entries: &[(String, String)]) -> Result<(), PersistError> {
        let mut args = Vec::with_capacity(entries.len() * 2 + 1);
        args.push(Value::from(name));
        for (field, value) in entries {
            args.push(Value::from(field.as_str()));
            args.push(Value::from(value.as_str()));
        }
        self.command("HSET", args).await.map(|_| ())
    }

    async fn hkeys(&self, name: &str) -> Result<Vec<String>, PersistError> {
        let result = self.command("HKEYS", vec![Value::from(name)]).await?;
        Ok(strings("HKEYS", result)?.into_iter().flatten().collect())
    }

    async fn hmget(
        &self,
        name: &str,
        fields: &[String],
    ) -> Result<Option<Vec<Option<String>>>, PersistError> {
        let mut args = Vec::with_capacity(fields.len() + 1);
        args.push(Value::from(name));
        args.extend(fields.iter().map(|field| Value::from(field.as_str())));
        match self.command("HMGET", args).await? {
            Value::Null => Ok(None),
            other => strings("HMGET", other).map(Some),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        self.command("SET", vec![Value::from(key), Value::from(value)])
            .await
            .map(|_| ())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        match self.command("GET", vec![Value::from(key)]).await? {
            Value::Null => Ok(None),
            Value::String(text) => Ok(Some(text)),
            other => Err(PersistError::Response {
                command: "GET",
                message: format!("expected a string or null, received {other}"),
            }),
        }
    }
}

fn convert_reqwest_error(error: reqwest::Error, url: &str) -> PersistError {
    if let Some(status) = error.status() {
        return PersistError::Http {
            url: url.to_owned(),
            status: status.as_u16(),
            message: error.to_string(),
        };
    }

    let kind = if error.is_timeout() {
        std::io::ErrorKind::TimedOut
    } else {
        std::io::ErrorKind::Other
    };
    PersistError::Network {
        url: url.to_owned(),
        source: std::io::Error::new(kind, error),
    }
}
