//! Async HTTP client with built-in retry logic.

use anyhow::Result;
use reqwest::{Client, Method, Response};

use super::classify;
use super::options::RequestOptions;
use crate::retry::{Retried, RetryPolicy, with_retry};

/// HTTP client that retries transport failures according to a [`RetryPolicy`].
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
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Sends a GET request, retrying on transport failure.
    pub async fn get(
        &self,
        url: &str,
        policy: &RetryPolicy,
        options: &RequestOptions,
    ) -> Result<Response> {
        Ok(self
            .send(Method::GET, url, policy, 0, options)
            .await?
            .into_inner())
    }

    /// Sends a POST request, retrying on transport failure.
    pub async fn post(
        &self,
        url: &str,
        policy: &RetryPolicy,
        options: &RequestOptions,
    ) -> Result<Response> {
        Ok(self
            .send(Method::POST, url, policy, 0, options)
            .await?
            .into_inner())
    }

    /// Sends a request, resuming after `trials` attempts already made.
    ///
    /// Any response counts as a success unless the policy asks to retry on
    /// status. When every attempt fails at the transport layer, the last
    /// `reqwest::Error` is returned unchanged.
    #[tracing::instrument(skip(self, policy, options))]
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        policy: &RetryPolicy,
        trials: u32,
        options: &RequestOptions,
    ) -> Result<Retried<Response>> {
        let label = format!("{} {}", method, url);

        with_retry(&label, policy, trials, || async {
            let request = options.apply(self.client.request(method.clone(), url));
            classify(policy, request.send().await, Response::status)
        })
        .await
    }
}

/// Sends a GET request with a default client.
pub async fn get(url: &str, policy: &RetryPolicy, options: &RequestOptions) -> Result<Response> {
    HttpClient::default().get(url, policy, options).await
}

/// Sends a POST request with a default client.
pub async fn post(url: &str, policy: &RetryPolicy, options: &RequestOptions) -> Result<Response> {
    HttpClient::default().post(url, policy, options).await
}
