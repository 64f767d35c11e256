//! Shared HTTP plumbing for the knowledge-base and geocoder adapters.
//!
//! - `HttpClient`: blocking client with retry / backoff / error classification
//! - `Pacer`: minimum interval between requests plus a pause every N requests
//!
//! Both public services ask clients to stay around one request per second;
//! the pacer is the only place that sleeps for politeness, the retry loop
//! only sleeps after a failure.

use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

use catalink_recon::LookupError;

// ── Constants ───────────────────────────────────────────────────────

pub(crate) const MAX_RETRIES: u32 = 3;
pub(crate) const USER_AGENT: &str = concat!("catalink/", env!("CARGO_PKG_VERSION"));

// ── Pacer ───────────────────────────────────────────────────────────

/// Request pacing. Does not affect what a lookup returns, only when.
#[derive(Debug)]
pub(crate) struct Pacer {
    interval: Duration,
    batch_size: u32,
    batch_pause: Duration,
    last: Cell<Option<Instant>>,
    sent: Cell<u32>,
}

impl Pacer {
    pub(crate) fn new(interval: Duration, batch_size: u32, batch_pause: Duration) -> Self {
        Self {
            interval,
            batch_size,
            batch_pause,
            last: Cell::new(None),
            sent: Cell::new(0),
        }
    }

    /// No pacing at all. Used by tests against a local mock server.
    #[cfg(test)]
    pub(crate) fn unthrottled() -> Self {
        Self::new(Duration::ZERO, 0, Duration::ZERO)
    }

    /// Delay owed before the next request, given the time now.
    fn delay_at(&self, now: Instant) -> Duration {
        let sent = self.sent.get();
        if self.batch_size > 0 && sent > 0 && sent % self.batch_size == 0 {
            return self.batch_pause.max(self.interval_remaining(now));
        }
        self.interval_remaining(now)
    }

    fn interval_remaining(&self, now: Instant) -> Duration {
        match self.last.get() {
            Some(last) => self.interval.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Block until the next request may go out, then count it.
    pub(crate) fn wait(&self) {
        let delay = self.delay_at(Instant::now());
        if !delay.is_zero() {
            tracing::trace!(delay_ms = delay.as_millis() as u64, "pacing");
            thread::sleep(delay);
        }
        self.last.set(Some(Instant::now()));
        self.sent.set(self.sent.get() + 1);
    }

    pub(crate) fn sent(&self) -> u32 {
        self.sent.get()
    }
}

// ── Retry policy ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

// ── HttpClient ──────────────────────────────────────────────────────

/// Shared HTTP client that handles pacing, retry, backoff, and error
/// classification.
///
/// Adapters own their base URL and query shape. They pass a
/// request-building closure to [`HttpClient::get_json`] which handles the
/// retry loop and maps HTTP status codes to [`LookupError`]s.
pub(crate) struct HttpClient {
    http: reqwest::blocking::Client,
    source_name: String,
    retry: RetryPolicy,
    pacer: Pacer,
}

impl HttpClient {
    pub(crate) fn new(
        source_name: &str,
        timeout: Duration,
        pacer: Pacer,
    ) -> Result<Self, LookupError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| LookupError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            source_name: source_name.to_string(),
            retry: RetryPolicy::default(),
            pacer,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub(crate) fn source_name(&self) -> &str {
        &self.source_name
    }

    pub(crate) fn requests_sent(&self) -> u32 {
        self.pacer.sent()
    }

    /// Make a GET request with pacing, retry and exponential backoff.
    ///
    /// `build_request` is called once per attempt. It receives the
    /// underlying `reqwest::blocking::Client` and must return a fully
    /// configured `RequestBuilder` (URL, headers, query params).
    pub(crate) fn get_json(
        &self,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<serde_json::Value, LookupError> {
        let max_retries = self.retry.max_retries;
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 0;

        loop {
            self.pacer.wait();
            let result = build_request(&self.http).send();

            let wait = match result {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    // Other 4xx (not 429): fail immediately
                    if (400..500).contains(&status) && status != 429 {
                        let body = resp.text().unwrap_or_default();
                        return Err(LookupError::Upstream {
                            status,
                            message: format!("{} rejected the request: {}", self.source_name, snippet(&body)),
                        });
                    }

                    // Retryable: 429, 5xx
                    if status == 429 || status >= 500 {
                        if attempt == max_retries {
                            return Err(if status == 429 {
                                LookupError::RateLimited { attempts: attempt + 1 }
                            } else {
                                LookupError::Upstream {
                                    status,
                                    message: format!(
                                        "{} upstream error after {} attempts",
                                        self.source_name,
                                        attempt + 1,
                                    ),
                                }
                            });
                        }

                        // Respect Retry-After header for 429
                        let wait = if status == 429 {
                            resp.headers()
                                .get("retry-after")
                                .and_then(|v| v.to_str().ok())
                                .and_then(|v| v.trim().parse::<u64>().ok())
                                .map(Duration::from_secs)
                                .unwrap_or(backoff)
                        } else {
                            backoff
                        };

                        tracing::warn!(
                            source = %self.source_name,
                            status,
                            "retry {}/{} in {}ms",
                            attempt + 1,
                            max_retries,
                            wait.as_millis(),
                        );
                        wait
                    } else {
                        // Success: read as text first so a BOM or an empty
                        // body gives a readable error
                        let text = resp.text().map_err(|e| {
                            LookupError::Network(format!(
                                "failed to read {} response body: {e}",
                                self.source_name
                            ))
                        })?;
                        let trimmed = text.trim_start_matches('\u{feff}');
                        return serde_json::from_str(trimmed).map_err(|e| {
                            LookupError::Malformed(format!(
                                "{} returned invalid JSON: {e} (body: {})",
                                self.source_name,
                                snippet(trimmed),
                            ))
                        });
                    }
                }
                Err(e) => {
                    // Network/timeout errors: retry
                    if attempt == max_retries {
                        return Err(LookupError::Network(format!(
                            "{} unreachable after {} attempts: {e}",
                            self.source_name,
                            attempt + 1,
                        )));
                    }
                    tracing::warn!(
                        source = %self.source_name,
                        error = %e,
                        "retry {}/{} in {}ms",
                        attempt + 1,
                        max_retries,
                        backoff.as_millis(),
                    );
                    backoff
                }
            };

            thread::sleep(wait);
            backoff *= 2;
            attempt += 1;
        }
    }
}

fn snippet(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    &body[..end]
}

#[cfg(test)]
pub(crate) fn test_client(source_name: &str) -> HttpClient {
    HttpClient::new(source_name, Duration::from_secs(5), Pacer::unthrottled())
        .unwrap()
        .with_retry(RetryPolicy { max_retries: MAX_RETRIES, initial_backoff: Duration::ZERO })
}
