// Property-based tests for id extraction, retry classification and status
// handling.

use std::time::Duration;

use irp_client::http::retry::{RetryAfterSlot, RetryConfig, RetryPolicy, RETRYABLE_STATUSES};
use irp_client::riskmodeler::utils::id_from_location_value;
use irp_client::riskmodeler::WorkflowStatus;
use proptest::prelude::*;
use reqwest::StatusCode;

fn base_url_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("https://api-euw1.rms-ppe.com".to_string()),
        Just("http://127.0.0.1:8080".to_string()),
        "https://[a-z]{3,12}\\.example\\.com",
    ]
}

fn path_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("/riskmodeler/v1/workflows".to_string()),
        Just("/platform/geohaz/v1/jobs".to_string()),
        Just("/riskmodeler/v1/storage/77/path".to_string()),
        "(/[a-z0-9]{1,8}){1,4}",
    ]
}

proptest! {
    #[test]
    fn location_id_is_the_trailing_segment(
        base in base_url_strategy(),
        path in path_strategy(),
        id in 1u64..u64::MAX,
    ) {
        let location = format!("{base}{path}/{id}");
        let extracted = id_from_location_value(&location).unwrap();
        prop_assert_eq!(extracted, id.to_string());
        prop_assert_eq!(extracted.parse::<u64>().unwrap(), id);
    }

    #[test]
    fn trailing_slash_never_yields_an_id(base in base_url_strategy(), path in path_strategy()) {
        let location = format!("{base}{path}/");
        prop_assert!(id_from_location_value(&location).is_err());
    }

    #[test]
    fn only_throttling_and_gateway_statuses_retry(code in 100u16..600) {
        let status = StatusCode::from_u16(code).unwrap();
        prop_assert_eq!(
            RetryPolicy::is_retryable_status(status),
            RETRYABLE_STATUSES.contains(&code)
        );
    }

    #[test]
    fn retry_budget_is_never_exceeded(max_retries in 0u32..10, jitter in any::<bool>()) {
        let policy = RetryPolicy::new(RetryConfig { max_retries, jitter, ..RetryConfig::default() });
        let delays: Vec<Duration> = policy.strategy(RetryAfterSlot::default()).collect();
        prop_assert_eq!(delays.len(), max_retries as usize);
        prop_assert!(delays.iter().all(|delay| *delay <= Duration::from_secs(120)));
    }

    #[test]
    fn backoff_grows_and_stays_capped(base_ms in 1u64..2_000, index in 0u32..40) {
        let policy = RetryPolicy::new(RetryConfig {
            backoff_base_ms: base_ms,
            ..RetryConfig::default()
        });
        let delay = policy.backoff(index);
        prop_assert!(delay <= Duration::from_secs(120));
        prop_assert!(policy.backoff(index + 1) >= delay);
    }

    #[test]
    fn unknown_statuses_are_not_terminal(raw in "[A-Z_]{1,20}") {
        let status = WorkflowStatus::from(raw.as_str());
        let terminal = matches!(raw.as_str(), "FINISHED" | "FAILED" | "CANCELLED");
        prop_assert_eq!(status.is_terminal(), terminal);
        prop_assert_eq!(status.is_failure(), matches!(raw.as_str(), "FAILED" | "CANCELLED"));
    }
}
