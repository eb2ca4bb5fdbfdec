// Retry policy for Risk Modeler API calls: exponential backoff on throttling
// and transient gateway failures, nothing else.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio_retry::strategy::{jitter, ExponentialBackoff};

use crate::riskmodeler::IrpError;

/// Status codes that are worth another attempt.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each following retry.
    pub backoff_base_ms: u64,
    /// Upper bound for any single delay.
    pub max_backoff_secs: u64,
    /// Scale each delay by a random factor in [0, 1).
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_base_ms: 500,
            max_backoff_secs: 120,
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

/// `Retry-After` seen on the last attempt. The action fills it, the strategy
/// drains it in place of the next computed delay.
#[derive(Debug, Clone, Default)]
pub struct RetryAfterSlot(Arc<Mutex<Option<Duration>>>);

impl RetryAfterSlot {
    pub fn set(&self, delay: Duration) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(delay);
        }
    }

    pub fn take(&self) -> Option<Duration> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    pub fn is_retryable_status(status: StatusCode) -> bool {
        RETRYABLE_STATUSES.contains(&status.as_u16())
    }

    /// Throttling, gateway statuses, connection failures and timeouts.
    pub fn is_retryable(error: &IrpError) -> bool {
        match error {
            IrpError::Api { status, .. } => RETRYABLE_STATUSES.contains(status),
            IrpError::Transport { source, .. } => source.is_connect() || source.is_timeout(),
            _ => false,
        }
    }

    /// Unbounded, jitter-free delays: base, 2*base, 4*base, ... capped.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        // ExponentialBackoff yields factor * 2^n ms for n = 1, 2, ...
        ExponentialBackoff::from_millis(2)
            .factor(self.config.backoff_base_ms / 2)
            .max_delay(self.config.max_backoff())
    }

    /// Delay before retry number `retry_index` (0-based), without jitter.
    pub fn backoff(&self, retry_index: u32) -> Duration {
        self.delays()
            .nth(retry_index as usize)
            .unwrap_or_else(|| self.config.max_backoff())
    }

    /// The strategy for one request: at most `max_retries` delays, jittered
    /// when configured, with a pending `Retry-After` taking the place of the
    /// computed delay.
    pub fn strategy(&self, retry_after: RetryAfterSlot) -> impl Iterator<Item = Duration> {
        let use_jitter = self.config.jitter;
        let max_backoff = self.config.max_backoff();
        self.delays()
            .take(self.config.max_retries as usize)
            .map(move |delay| if use_jitter { jitter(delay) } else { delay })
            .map(move |delay| retry_after.take().map_or(delay, |after| after.min(max_backoff)))
    }

    /// `Retry-After` to honour for this response. Only 429 and 503 carry one.
    pub fn retry_after_for(status: StatusCode, headers: &HeaderMap) -> Option<Duration> {
        match status {
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => retry_after(headers),
            _ => None,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Parse a delta-seconds `Retry-After` header. HTTP-date values are ignored.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn retries_only_throttling_and_gateway_errors() {
        for code in [429, 500, 502, 503, 504] {
            assert!(RetryPolicy::is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
        for code in [400, 401, 403, 404, 409, 422, 501, 505] {
            assert!(!RetryPolicy::is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn api_errors_retry_on_status_only() {
        let api = |status| IrpError::Api {
            method: "GET".to_string(),
            url: "u".to_string(),
            status,
            detail: None,
        };
        assert!(RetryPolicy::is_retryable(&api(503)));
        assert!(!RetryPolicy::is_retryable(&api(404)));
        assert!(!RetryPolicy::is_retryable(&IrpError::Config("no key".to_string())));
    }

    #[test]
    fn strategy_spends_exactly_the_retry_budget() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.strategy(RetryAfterSlot::default()).count(), 5);

        let none = RetryPolicy::new(RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        });
        assert_eq!(none.strategy(RetryAfterSlot::default()).count(), 0);
    }

    #[test]
    fn backoff_doubles_from_half_a_second() {
        let policy = RetryPolicy::default();
        let delays: Vec<u128> = policy
            .strategy(RetryAfterSlot::default())
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(delays, vec![500, 1000, 2000, 4000, 8000]);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::new(RetryConfig {
            max_backoff_secs: 3,
            ..RetryConfig::default()
        });
        assert_eq!(policy.backoff(3), Duration::from_secs(3));
        assert_eq!(policy.backoff(40), Duration::from_secs(3));
    }

    #[test]
    fn jitter_never_exceeds_the_computed_delay() {
        let policy = RetryPolicy::new(RetryConfig {
            jitter: true,
            ..RetryConfig::default()
        });
        for _ in 0..50 {
            let delays: Vec<Duration> = policy.strategy(RetryAfterSlot::default()).collect();
            assert_eq!(delays.len(), 5);
            for (index, delay) in delays.into_iter().enumerate() {
                assert!(delay <= policy.backoff(index as u32), "delay {delay:?} too long");
            }
        }
    }

    #[test]
    fn pending_retry_after_replaces_one_delay() {
        let slot = RetryAfterSlot::default();
        let mut strategy = RetryPolicy::default().strategy(slot.clone());

        slot.set(Duration::from_secs(7));
        assert_eq!(strategy.next(), Some(Duration::from_secs(7)));
        assert_eq!(strategy.next(), Some(Duration::from_millis(1000)));

        slot.set(Duration::from_secs(600));
        assert_eq!(strategy.next(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn retry_after_is_read_for_throttling_only() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

        assert_eq!(
            RetryPolicy::retry_after_for(StatusCode::TOO_MANY_REQUESTS, &headers),
            Some(Duration::from_secs(7))
        );
        assert_eq!(
            RetryPolicy::retry_after_for(StatusCode::SERVICE_UNAVAILABLE, &headers),
            Some(Duration::from_secs(7))
        );
        assert_eq!(RetryPolicy::retry_after_for(StatusCode::BAD_GATEWAY, &headers), None);
    }

    #[test]
    fn http_date_retry_after_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }
}
