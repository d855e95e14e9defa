//! Dev server readiness probe
//!
//! Polls a dev server URL with exponential backoff until it answers.

use backoff::ExponentialBackoffBuilder;
use std::time::Duration;

use crate::error::BundlerError;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Wait until `url` answers an HTTP request, giving up after `budget`
///
/// Any response short of a server error counts as ready; a dev server
/// answering 404 for `/` is still listening.
pub async fn wait_until_ready(url: &str, budget: Duration) -> Result<(), BundlerError> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| BundlerError::NotReady {
            url: url.to_string(),
            error: e.to_string(),
        })?;

    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(50))
        .with_max_interval(Duration::from_secs(1))
        .with_max_elapsed_time(Some(budget))
        .build();

    let client = &client;
    backoff::future::retry(policy, || async move {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| backoff::Error::transient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            tracing::debug!("{url} answered {status}, retrying");
            return Err(backoff::Error::transient(format!("HTTP {status}")));
        }

        Ok(())
    })
    .await
    .map_err(|error| BundlerError::NotReady {
        url: url.to_string(),
        error,
    })
}
