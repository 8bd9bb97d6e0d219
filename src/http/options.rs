//! Transport options forwarded verbatim to every attempt of a request.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::time::Duration;

/// Request body kept in an owned form so it can be replayed on each retry.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

/// Opaque set of options applied to the underlying client request.
///
/// The retry loop never looks inside; it only hands the options to the
/// request builder before each attempt.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: Option<RequestBody>,
    timeout: Option<Duration>,
    basic_auth: Option<(String, Option<String>)>,
    bearer_auth: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header. Name and value are validated here so a malformed header
    /// is reported before any request goes out.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("Invalid header name: {:?}", name))?;
        let value = HeaderValue::from_str(value)
            .with_context(|| format!("Invalid value for header {}", name))?;
        self.headers.append(name, value);
        Ok(self)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(RequestBody::Bytes(body.into()));
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let value = serde_json::to_value(value).context("Failed to serialize JSON body")?;
        self.body = Some(RequestBody::Json(value));
        Ok(self)
    }

    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        let pairs = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.body = Some(RequestBody::Form(pairs));
        self
    }

    /// Per-attempt timeout. This is the only way to bound a single attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.basic_auth = Some((username.into(), password));
        self
    }

    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.bearer_auth = Some(token.into());
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body_ref(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    /// Applies every option to a request builder.
    pub(crate) fn apply<B: OptionsTarget>(&self, mut builder: B) -> B {
        if !self.headers.is_empty() {
            builder = builder.headers(self.headers.clone());
        }
        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some((username, password)) = &self.basic_auth {
            builder = builder.basic_auth(username, password.as_deref());
        }
        if let Some(token) = &self.bearer_auth {
            builder = builder.bearer_auth(token);
        }
        match &self.body {
            Some(RequestBody::Bytes(bytes)) => builder.body(bytes.clone()),
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Form(pairs)) => builder.form(pairs),
            None => builder,
        }
    }
}

/// The subset of a request builder that [`RequestOptions`] drives.
/// Implemented for both the async and the blocking reqwest builders.
pub(crate) trait OptionsTarget: Sized {
    fn headers(self, headers: HeaderMap) -> Self;
    fn query(self, pairs: &[(String, String)]) -> Self;
    fn timeout(self, timeout: Duration) -> Self;
    fn basic_auth(self, username: &str, password: Option<&str>) -> Self;
    fn bearer_auth(self, token: &str) -> Self;
    fn body(self, bytes: Vec<u8>) -> Self;
    fn json(self, value: &serde_json::Value) -> Self;
    fn form(self, pairs: &[(String, String)]) -> Self;
}

macro_rules! impl_options_target {
    ($builder:ty) => {
        impl OptionsTarget for $builder {
            fn headers(self, headers: HeaderMap) -> Self {
                <$builder>::headers(self, headers)
            }
            fn query(self, pairs: &[(String, String)]) -> Self {
                <$builder>::query(self, pairs)
            }
            fn timeout(self, timeout: Duration) -> Self {
                <$builder>::timeout(self, timeout)
            }
            fn basic_auth(self, username: &str, password: Option<&str>) -> Self {
                <$builder>::basic_auth(self, username, password)
            }
            fn bearer_auth(self, token: &str) -> Self {
                <$builder>::bearer_auth(self, token)
            }
            fn body(self, bytes: Vec<u8>) -> Self {
                <$builder>::body(self, bytes)
            }
            fn json(self, value: &serde_json::Value) -> Self {
                <$builder>::json(self, value)
            }
            fn form(self, pairs: &[(String, String)]) -> Self {
                <$builder>::form(self, pairs)
            }
        }
    };
}

impl_options_target!(reqwest::RequestBuilder);
impl_options_target!(reqwest::blocking::RequestBuilder);
