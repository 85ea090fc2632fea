use crate::prelude::*;
use chrono::Utc;
use log::{debug, warn};
use mastodon_to_bluesky_core::backoff::{
    is_retryable, is_retryable_write, retry_after_hint, RetryPolicy,
};
use reqwest::{RequestBuilder, Response};

pub const USER_AGENT: &str = concat!("mastodon-to-bluesky/", env!("CARGO_PKG_VERSION"));

/// Rate limit reset headers, Mastodon's first
const RESET_HEADERS: &[&str] = &["x-ratelimit-reset", "ratelimit-reset"];

fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Whether a request can safely reach the server more than once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Reads, logins and content-addressed uploads
    Idempotent,
    /// Creates a record; retried only when the server surely did not run it
    Write,
}

impl RequestKind {
    fn retries_status(self, status: u16) -> bool {
        match self {
            RequestKind::Idempotent => is_retryable(status),
            RequestKind::Write => is_retryable_write(status),
        }
    }

    fn retries_error(self, err: &reqwest::Error) -> bool {
        match self {
            RequestKind::Idempotent => err.is_connect() || err.is_timeout(),
            RequestKind::Write => err.is_connect(),
        }
    }
}

/// Send an idempotent request, retrying rate limits, server errors and
/// connection failures
pub async fn send_with_retry<F>(policy: &RetryPolicy, context: &str, build: F) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    send_request(policy, RequestKind::Idempotent, context, build).await
}

/// Send a request, retrying what `kind` allows
///
/// `build` is called once per attempt since a `RequestBuilder` can't be
/// reused. Any non-success response that is not retried becomes
/// [`Error::Api`] with the response body.
pub async fn send_request<F>(
    policy: &RetryPolicy,
    kind: RequestKind,
    context: &str,
    build: F,
) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;

    loop {
        match build().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status().as_u16();

                if kind.retries_status(status) && policy.should_retry(attempt) {
                    let reset = RESET_HEADERS.iter().find_map(|name| header(&response, name));
                    let retry_after = header(&response, "retry-after");
                    let hint = retry_after_hint(retry_after, reset, Utc::now());
                    let delay = policy.delay(attempt, hint);

                    warn!(
                        "{context}: HTTP {status}, retrying in {:.1}s (attempt {}/{})",
                        delay.as_secs_f64(),
                        attempt + 1,
                        policy.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }

                if status == 429 {
                    return Err(Error::RateLimited {
                        context: context.to_string(),
                        retries: attempt,
                    }
                    .into());
                }

                let body = response.text().await.unwrap_or_default();
                debug!("{context}: HTTP {status}: {body}");
                return Err(Error::Api {
                    context: context.to_string(),
                    status,
                    body,
                }
                .into());
            }
            Err(err) if kind.retries_error(&err) && policy.should_retry(attempt) => {
                let delay = policy.delay(attempt, None);
                warn!(
                    "{context}: {err}, retrying in {:.1}s (attempt {}/{})",
                    delay.as_secs_f64(),
                    attempt + 1,
                    policy.max_retries
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(eyre!("{}: {}", context, err)),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: std::time::Duration::from_millis(1),
        max_delay: std::time::Duration::from_millis(10),
    }
}
