use std::future::Future;
use std::time::Duration;

use tracing::warn;

use rad_provider_core::{AdapterConfig, AdapterError};

const BODY_EXCERPT_LIMIT: usize = 512;

/// `delay = base · 2^(attempt-1)`, capped. Attempts count from 1.
pub(crate) fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}

/// Numeric `Retry-After` seconds; HTTP-date values are ignored.
pub(crate) fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

/// Local retry loop around one upstream exchange. Retries transport errors,
/// 429, and 5xx up to `max_retries`; other statuses return immediately.
/// A 2xx response is handed back unread so streaming bodies stay lazy.
pub(crate) async fn send_with_retries<F, Fut>(
    config: &AdapterConfig,
    operation: &str,
    send: F,
) -> Result<wreq::Response, AdapterError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<wreq::Response, wreq::Error>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let failure = match send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if (200..300).contains(&status) {
                    return Ok(response);
                }
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(parse_retry_after);
                let body = response.bytes().await.unwrap_or_default();
                AdapterError::from_status(status, &excerpt(&body), retry_after)
            }
            Err(err) => classify_transport(&err),
        };

        if !failure.is_retryable() || attempt > config.max_retries {
            return Err(failure);
        }

        let delay = backoff_delay(config.retry_base_delay, config.max_retry_delay, attempt);
        warn!(
            provider = %config.name,
            op = %operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "upstream attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

pub(crate) fn classify_transport(err: &wreq::Error) -> AdapterError {
    if err.is_timeout() {
        AdapterError::timeout(err.to_string())
    } else {
        AdapterError::transport(err.to_string())
    }
}

fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut out: String = text.chars().take(BODY_EXCERPT_LIMIT).collect();
    if text.len() > out.len() {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(200);
        let max = Duration::from_secs(5);
        assert_eq!(backoff_delay(base, max, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, max, 2), Duration::from_millis(400));
        assert_eq!(backoff_delay(base, max, 3), Duration::from_millis(800));
        assert_eq!(backoff_delay(base, max, 6), Duration::from_secs(5));
        assert_eq!(backoff_delay(base, max, 40), Duration::from_secs(5));
    }

    #[test]
    fn retry_after_numeric_only() {
        assert_eq!(parse_retry_after("60"), Some(60));
        assert_eq!(parse_retry_after(" 5 "), Some(5));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after(""), None);
    }
}
