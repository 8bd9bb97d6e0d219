//! HTTP GET/POST with bounded retry on transport failure.

pub mod blocking;
mod client;
mod options;

pub use client::{HttpClient, get, post};
pub use options::{RequestBody, RequestOptions};

use reqwest::StatusCode;

use crate::retry::{Attempt, RetryPolicy};

/// Maps the outcome of one `send()` onto the retry loop's view of it.
///
/// Builder errors (bad URL, invalid body) are fatal; every other client error
/// is a transport failure. A response is a success unless the policy rejects
/// non-2xx statuses.
pub(crate) fn classify<R>(
    policy: &RetryPolicy,
    result: Result<R, reqwest::Error>,
    status_of: fn(&R) -> StatusCode,
) -> Attempt<R> {
    match result {
        Ok(response) => {
            let status = status_of(&response);
            if policy.retry_on_status && !status.is_success() {
                Attempt::Rejected(status)
            } else {
                Attempt::Success(response)
            }
        }
        Err(e) if e.is_builder() => Attempt::Fatal(e.into()),
        Err(e) => Attempt::Failed(e.into()),
    }
}

#[cfg(test)]
#[path = "../../tests/common/mod.rs"]
pub(crate) mod test_support;
