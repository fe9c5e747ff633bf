//! Expiration-time derivation from response headers.

use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::header::HeaderMap;

/// Computes an absolute expiration time (epoch milliseconds; `0` = none)
/// from the response headers:
///
/// - `Cache-Control: max-age=N` takes precedence over `Expires` and
///   yields `now + N seconds`.
/// - Otherwise, if both `Expires` and `Date` are present, expiration is
///   `now + (Expires - Date)` — computed as a *delta* so clock skew
///   between client and server does not leak in.
/// - Otherwise, if only `Expires` is present, it is used directly.
/// - Otherwise `0` (no expiration).
pub fn compute_expiration_ms(headers: &HeaderMap) -> u64 {
    let now_ms = now_ms();

    if let Some(max_age) = max_age_seconds(headers) {
        return now_ms + max_age * 1000;
    }

    let expires = header_as_epoch_ms(headers, reqwest::header::EXPIRES);
    let date = header_as_epoch_ms(headers, reqwest::header::DATE);

    match (expires, date) {
        (Some(expires), Some(date)) => {
            let delta = expires.saturating_sub(date);
            now_ms + delta
        }
        (Some(expires), None) => expires,
        _ => 0,
    }
}

fn max_age_seconds(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(reqwest::header::CACHE_CONTROL)?.to_str().ok()?;
    value.split(',').find_map(|directive| {
        let directive = directive.trim();
        directive
            .strip_prefix("max-age=")
            .and_then(|v| v.trim().parse::<u64>().ok())
    })
}

fn header_as_epoch_ms(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<u64> {
    let value = headers.get(name)?.to_str().ok()?;
    let parsed = httpdate::parse_http_date(value).ok()?;
    let millis = parsed.duration_since(UNIX_EPOCH).ok()?.as_millis();
    Some(millis as u64)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, CACHE_CONTROL, DATE, EXPIRES};

    #[test]
    fn scenario_expiration_from_expires_and_date() {
        // Date: t0, Expires: t0+60s, no Cache-Control
        let mut headers = HeaderMap::new();
        let t0 = httpdate::fmt_http_date(SystemTime::now());
        let t0_plus_60 = httpdate::fmt_http_date(SystemTime::now() + std::time::Duration::from_secs(60));
        headers.insert(DATE, HeaderValue::from_str(&t0).unwrap());
        headers.insert(EXPIRES, HeaderValue::from_str(&t0_plus_60).unwrap());

        let expiration = compute_expiration_ms(&headers);
        let expected = now_ms() + 60_000;
        assert!(expiration.abs_diff(expected) < 2_000, "expiration should be ~now+60s");
    }

    #[test]
    fn scenario_cache_control_overrides_expires() {
        // Cache-Control: max-age=30 wins regardless of Expires
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=30"));
        let far_future = httpdate::fmt_http_date(SystemTime::now() + std::time::Duration::from_secs(3600));
        headers.insert(EXPIRES, HeaderValue::from_str(&far_future).unwrap());

        let expiration = compute_expiration_ms(&headers);
        let expected = now_ms() + 30_000;
        assert!(expiration.abs_diff(expected) < 2_000);
    }

    #[test]
    fn no_headers_means_no_expiration() {
        let headers = HeaderMap::new();
        assert_eq!(compute_expiration_ms(&headers), 0);
    }
}
