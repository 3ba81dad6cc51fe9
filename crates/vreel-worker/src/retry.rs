//! Rate-limit-aware retry for content descriptions.
//!
//! Rate limits escalate geometrically from the policy's base delay, unless the
//! error payload carries a retry-after hint, which is used as-is (capped).
//! Any other failure waits the policy's fixed delay.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use metrics::counter;
use regex::Regex;
use tracing::{debug, info, warn};

use vreel_models::RetryPolicy;

use crate::error::AiError;
use crate::vision::VisionAnalyzer;

static RETRY_AFTER_MS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)retry_after_ms"?\s*[:=]\s*"?(\d+(?:\.\d+)?)"#).expect("valid regex"));

static RETRY_AFTER_SECS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)retry-after"?\s*[:=]\s*"?(\d+(?:\.\d+)?)"#).expect("valid regex"));

static RETRY_DELAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)retryDelay"?\s*[:=]\s*"(\d+(?:\.\d+)?)s""#).expect("valid regex"));

fn capture_secs(re: &Regex, text: &str, scale: f64) -> Option<Duration> {
    capture_f64(re, text).map(|v| Duration::try_from_secs_f64(v / scale).unwrap_or(Duration::MAX))
}

fn capture_f64(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)?
        .get(1)?
        .as_str()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Extract a retry-after hint from an error payload.
///
/// Understands `retry_after_ms: N` (milliseconds), `retry-after: N` (seconds)
/// and the `"retryDelay": "Ns"` form used in Google RPC error details.
///
/// Hints too large to represent saturate to [`Duration::MAX`]; the retry
/// policy caps them anyway.
pub fn parse_retry_after(text: &str) -> Option<Duration> {
    capture_secs(&RETRY_AFTER_MS, text, 1000.0)
        .or_else(|| capture_secs(&RETRY_DELAY, text, 1.0))
        .or_else(|| capture_secs(&RETRY_AFTER_SECS, text, 1.0))
}

/// What the retry loop produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DescribeOutcome {
    /// Non-empty description, if any attempt produced one
    pub description: Option<String>,
    /// Attempts made
    pub attempts: u32,
}

/// Describe `frames`, retrying per `policy`.
///
/// Never fails: running out of attempts yields `description: None`, which the
/// caller turns into `pending_retry`.
pub async fn describe_with_retry(
    analyzer: &dyn VisionAnalyzer,
    frames: &[PathBuf],
    policy: &RetryPolicy,
) -> DescribeOutcome {
    let mut attempts = 0u32;
    let mut rate_limits = 0u32;

    while policy.allows_another(attempts) {
        attempts += 1;

        let error = match analyzer.describe(frames).await {
            Ok(text) if !text.trim().is_empty() => {
                debug!(attempts, "Description obtained");
                return DescribeOutcome {
                    description: Some(text.trim().to_string()),
                    attempts,
                };
            }
            Ok(_) => AiError::EmptyResponse,
            Err(e) => e,
        };

        if !policy.allows_another(attempts) {
            warn!(attempts, error = %error, "Giving up on description");
            break;
        }

        let delay = match &error {
            AiError::RateLimited { retry_after, .. } => {
                let delay = policy.rate_limit_delay(rate_limits, *retry_after);
                rate_limits += 1;
                counter!("vreel_vision_retries_total", "reason" => "rate_limited").increment(1);
                delay
            }
            _ => {
                counter!("vreel_vision_retries_total", "reason" => "error").increment(1);
                policy.fixed_delay
            }
        };

        info!(
            attempt = attempts,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Description attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }

    DescribeOutcome {
        description: None,
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_parse_retry_after_forms() {
        assert_eq!(
            parse_retry_after(r#"{"error": {"retry_after_ms": 1500}}"#),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(parse_retry_after("Retry-After: 7"), Some(Duration::from_secs(7)));
        assert_eq!(
            parse_retry_after(r#"{"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "38s"}"#),
            Some(Duration::from_secs(38))
        );
        assert_eq!(
            parse_retry_after(r#""retryDelay": "0.5s""#),
            Some(Duration::from_millis(500))
        );
        assert_eq!(parse_retry_after("quota exceeded"), None);
    }

    #[test]
    fn test_oversized_hint_saturates() {
        assert_eq!(
            parse_retry_after("Retry-After: 99999999999999999999999"),
            Some(Duration::MAX)
        );
        let policy = RetryPolicy::default();
        let hint = parse_retry_after(r#"{"retry_after_ms": 999999999999999999999999999}"#);
        assert_eq!(policy.rate_limit_delay(1, hint), policy.max_delay);
    }

    /// Fails with a rate limit `failures` times, then succeeds.
    struct FlakyVision {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl VisionAnalyzer for FlakyVision {
        async fn describe(&self, _frames: &[PathBuf]) -> Result<String, AiError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(AiError::RateLimited {
                    message: "429 RESOURCE_EXHAUSTED".into(),
                    retry_after: (call % 2 == 0).then(|| Duration::from_secs(30)),
                })
            } else {
                Ok(" Infinity pool overlooking the sea ".into())
            }
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_last_attempt() {
        let vision = FlakyVision {
            failures: 9,
            calls: AtomicU32::new(0),
        };
        let outcome = describe_with_retry(&vision, &[], &RetryPolicy::immediate(10)).await;
        assert_eq!(outcome.attempts, 10);
        assert_eq!(
            outcome.description.as_deref(),
            Some("Infinity pool overlooking the sea")
        );
    }

    #[tokio::test]
    async fn test_exhaustion_yields_no_description() {
        let vision = FlakyVision {
            failures: 100,
            calls: AtomicU32::new(0),
        };
        let outcome = describe_with_retry(&vision, &[], &RetryPolicy::immediate(4)).await;
        assert_eq!(outcome.attempts, 4);
        assert!(outcome.description.is_none());
        assert_eq!(vision.calls.load(Ordering::SeqCst), 4);
    }
}
