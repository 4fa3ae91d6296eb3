//! HTTP transport shared by the source adapters.
//!
//! Adapters never talk to `reqwest` directly; they receive an `HttpFetch` at
//! construction. The production implementation (`ReqwestFetcher`) owns a
//! blocking client with a mandatory timeout, spaces requests to respect the
//! source's rate limit, and retries transient failures with exponential backoff.

use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::IngestError;

const USER_AGENT: &str = concat!("chronos/", env!("CARGO_PKG_VERSION"));

/// GET a JSON document.
///
/// Implementations must be safe to share across worker threads.
pub trait HttpFetch: Send + Sync {
    fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, IngestError>;
}

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub max_retries: u32,
    pub requests_per_minute: u32,
    /// Delay before the first retry; doubled for each following attempt.
    pub backoff_base: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            requests_per_minute: 120,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Minimum spacing between consecutive requests.
///
/// Callers reserve the next free slot under the lock and sleep outside it, so
/// concurrent workers queue up instead of bursting.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn per_minute(requests: u32) -> Self {
        Self {
            interval: Duration::from_secs(60) / requests.max(1),
            next_slot: Mutex::new(None),
        }
    }

    /// Reserve a slot and return how long the caller has to wait for it.
    fn reserve(&self) -> Duration {
        let mut next = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let slot = match *next {
            Some(t) if t > now => t,
            _ => now,
        };
        *next = Some(slot + self.interval);
        slot.saturating_duration_since(now)
    }

    pub fn acquire(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "rate_limit_sleep");
            thread::sleep(wait);
        }
    }
}

/// Production transport built on `reqwest::blocking`.
pub struct ReqwestFetcher {
    origin: &'static str,
    client: Client,
    limiter: RateLimiter,
    options: HttpOptions,
}

impl ReqwestFetcher {
    pub fn new(origin: &'static str, options: HttpOptions) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| IngestError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            origin,
            client,
            limiter: RateLimiter::per_minute(options.requests_per_minute),
            options,
        })
    }

    fn send_once(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, IngestError> {
        self.limiter.acquire();

        // `without_url` keeps query strings (API keys) out of error messages.
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|e| IngestError::transient(self.origin, None, format!("{url}: {}", e.without_url())))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(IngestError::transient(
                self.origin,
                Some(status.as_u16()),
                format!("{url} returned status {status}"),
            ));
        }

        debug!(origin = self.origin, url, status = status.as_u16(), "api_request_success");

        resp.json::<Value>()
            .map_err(|e| IngestError::malformed(self.origin, format!("{url}: invalid JSON body: {}", e.without_url())))
    }
}

impl HttpFetch for ReqwestFetcher {
    fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, IngestError> {
        with_retries(self.origin, url, &self.options, || self.send_once(url, query))
    }
}

/// Call `send` until it succeeds, fails with a non-retryable error, or
/// `max_retries` retries have been spent.
fn with_retries<T>(
    origin: &str,
    url: &str,
    options: &HttpOptions,
    mut send: impl FnMut() -> Result<T, IngestError>,
) -> Result<T, IngestError> {
    let mut attempt = 0u32;
    loop {
        match send() {
            Ok(body) => return Ok(body),
            Err(err) if err.is_retryable() && attempt < options.max_retries => {
                let delay = backoff_delay(options.backoff_base, attempt);
                attempt += 1;
                warn!(
                    origin,
                    url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "http_retry"
                );
                thread::sleep(delay);
            }
            Err(err) => return Err(err),
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16))
}
