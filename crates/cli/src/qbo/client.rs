//! HTTP plumbing for the QuickBooks adapter: retry, backoff and status
//! classification into [`SinkError`].

use std::thread;
use std::time::Duration;

use tallysync_recon::SinkError;

pub(super) const MAX_RETRIES: u32 = 3;
pub(super) const USER_AGENT: &str = concat!("tallysync/", env!("CARGO_PKG_VERSION"));

/// Outcome of one HTTP exchange, before retry policy is applied.
enum Attempt {
    Done(serde_json::Value),
    Retry { wait: Duration, reason: String, exhausted: SinkError },
    Fail(SinkError),
}

pub(super) struct ApiClient {
    pub(super) http: reqwest::blocking::Client,
    backoff: Duration,
}

impl ApiClient {
    pub(super) fn new() -> Result<Self, SinkError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SinkError::Upstream(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            backoff: Duration::from_secs(1),
        })
    }

    /// First retry delay; doubles per attempt.
    #[cfg(test)]
    pub(super) fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Send with retry on 429, 5xx and network errors. Only for idempotent
    /// requests.
    pub(super) fn request_with_retry(
        &self,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<serde_json::Value, SinkError> {
        let mut backoff = self.backoff;

        for attempt in 0..=MAX_RETRIES {
            match self.exchange(build_request(&self.http), backoff) {
                Attempt::Done(body) => return Ok(body),
                Attempt::Fail(e) => return Err(e),
                Attempt::Retry { exhausted, .. } if attempt == MAX_RETRIES => {
                    return Err(exhausted)
                }
                Attempt::Retry { wait, reason, .. } => {
                    log::warn!(
                        "retry {}/{} in {:?} ({})",
                        attempt + 1,
                        MAX_RETRIES,
                        wait,
                        reason
                    );
                    thread::sleep(wait);
                    backoff *= 2;
                }
            }
        }

        Err(SinkError::Upstream("retry loop exited without a response".into()))
    }

    /// Send exactly once. Used for writes, where a blind resend could
    /// create duplicates.
    pub(super) fn send_once(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<serde_json::Value, SinkError> {
        match self.exchange(request, self.backoff) {
            Attempt::Done(body) => Ok(body),
            Attempt::Fail(e) => Err(e),
            Attempt::Retry {
                exhausted: SinkError::RateLimited(_),
                reason,
                ..
            } => Err(SinkError::RateLimited(format!("QBO rate limited ({reason})"))),
            Attempt::Retry { reason, .. } => {
                Err(SinkError::Upstream(format!("QBO request failed ({reason})")))
            }
        }
    }

    fn exchange(&self, request: reqwest::blocking::RequestBuilder, backoff: Duration) -> Attempt {
        let resp = match request.send() {
            Ok(resp) => resp,
            Err(e) => {
                return Attempt::Retry {
                    wait: backoff,
                    reason: e.to_string(),
                    exhausted: SinkError::Upstream(format!(
                        "QBO unreachable after {MAX_RETRIES} retries: {e}"
                    )),
                }
            }
        };

        let status = resp.status().as_u16();

        if status == 401 || status == 403 {
            let body: serde_json::Value = resp.json().unwrap_or(serde_json::Value::Null);
            let msg = extract_qbo_error(&body, status);
            return Attempt::Fail(SinkError::Auth(format!("QBO ({status}): {msg}")));
        }

        if status == 400 {
            let body: serde_json::Value = resp.json().unwrap_or(serde_json::Value::Null);
            let msg = extract_qbo_error(&body, status);
            return Attempt::Fail(SinkError::Rejected(format!("QBO ({status}): {msg}")));
        }

        if (400..500).contains(&status) && status != 429 {
            let body: serde_json::Value = resp.json().unwrap_or(serde_json::Value::Null);
            let msg = extract_qbo_error(&body, status);
            return Attempt::Fail(SinkError::Upstream(format!("QBO error ({status}): {msg}")));
        }

        if status == 429 {
            // Retry-After is in seconds
            let wait = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(backoff);
            return Attempt::Retry {
                wait,
                reason: "HTTP 429".into(),
                exhausted: SinkError::RateLimited(format!(
                    "QBO rate limited after {MAX_RETRIES} retries"
                )),
            };
        }

        if status >= 500 {
            return Attempt::Retry {
                wait: backoff,
                reason: format!("HTTP {status}"),
                exhausted: SinkError::Upstream(format!(
                    "QBO upstream error after {MAX_RETRIES} retries ({status})"
                )),
            };
        }

        let text = match resp.text() {
            Ok(text) => text,
            Err(e) => {
                return Attempt::Fail(SinkError::Protocol(format!(
                    "failed to read QBO response body: {e}"
                )))
            }
        };
        let trimmed = text.trim_start_matches('\u{feff}');
        match serde_json::from_str(trimmed) {
            Ok(body) => Attempt::Done(body),
            Err(e) => Attempt::Fail(SinkError::Protocol(format!(
                "failed to parse QBO JSON response: {} (body: {})",
                e,
                trimmed.chars().take(200).collect::<String>()
            ))),
        }
    }
}

/// Human-readable message from a QBO Fault body.
pub(super) fn extract_qbo_error(body: &serde_json::Value, status: u16) -> String {
    body["Fault"]["Error"][0]["Detail"]
        .as_str()
        .or_else(|| body["Fault"]["Error"][0]["Message"].as_str())
        .or_else(|| body["fault"]["error"][0]["detail"].as_str())
        .or_else(|| body["error_description"].as_str())
        .or_else(|| body["message"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"))
}
