// SPDX-License-Identifier: MIT

//! Bounded retry for outbound HTTP calls.
//!
//! Transport failures and 5xx responses are retried at most twice with
//! 250 ms then 1 s backoff. Anything else (including 4xx) is returned to the
//! caller for status mapping.

use crate::error::AppError;
use std::time::Duration;

const BACKOFF: [Duration; 2] = [Duration::from_millis(250), Duration::from_secs(1)];

/// Send a request, retrying per the transport policy.
///
/// The final response is returned even when it is a 5xx so the caller can
/// map it with its own error context.
pub(crate) async fn send_with_retry(
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, AppError> {
    let mut attempt = 0;

    loop {
        let req = request.try_clone().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("request body is not cloneable for retry"))
        })?;

        let retryable = attempt < BACKOFF.len();

        match req.send().await {
            Ok(response) if response.status().is_server_error() && retryable => {
                tracing::warn!(
                    status = response.status().as_u16(),
                    attempt,
                    "Server error, retrying"
                );
            }
            Ok(response) => return Ok(response),
            Err(e) if retryable => {
                tracing::warn!(error = %e, attempt, "Transport error, retrying");
            }
            Err(e) => return Err(AppError::Transport(e.to_string())),
        }

        tokio::time::sleep(BACKOFF[attempt]).await;
        attempt += 1;
    }
}
