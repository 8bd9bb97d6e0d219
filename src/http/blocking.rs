//! Blocking variant of the retrying HTTP helpers.
//!
//! Each call occupies the calling thread for every round trip plus the
//! sleeps between failed attempts. Do not call these from inside an async
//! runtime; use [`crate::http::HttpClient`] there instead.

use anyhow::Result;
use reqwest::Method;
use reqwest::blocking::{Client, Response};

use super::classify;
use super::options::RequestOptions;
use crate::retry::{Retried, RetryPolicy, with_retry_blocking};

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn get(&self, url: &str, policy: &RetryPolicy, options: &RequestOptions) -> Result<Response> {
        Ok(self.send(Method::GET, url, policy, 0, options)?.into_inner())
    }

    pub fn post(
        &self,
        url: &str,
        policy: &RetryPolicy,
        options: &RequestOptions,
    ) -> Result<Response> {
        Ok(self.send(Method::POST, url, policy, 0, options)?.into_inner())
    }

    /// See [`crate::http::HttpClient::send`].
    #[tracing::instrument(skip(self, policy, options))]
    pub fn send(
        &self,
        method: Method,
        url: &str,
        policy: &RetryPolicy,
        trials: u32,
        options: &RequestOptions,
    ) -> Result<Retried<Response>> {
        let label = format!("{} {}", method, url);

        with_retry_blocking(&label, policy, trials, || {
            let request = options.apply(self.client.request(method.clone(), url));
            classify(policy, request.send(), Response::status)
        })
    }
}

pub fn get(url: &str, policy: &RetryPolicy, options: &RequestOptions) -> Result<Response> {
    HttpClient::default().get(url, policy, options)
}

pub fn post(url: &str, policy: &RetryPolicy, options: &RequestOptions) -> Result<Response> {
    HttpClient::default().post(url, policy, options)
}
