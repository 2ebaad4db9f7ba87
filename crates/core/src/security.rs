use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::clock::Clock;

type HmacSha256 = Hmac<Sha256>;

/// Verifies the channel's `sha256=<hex>` signature header against an
/// HMAC-SHA256 of the raw request body. Comparison is constant-time via
/// `Mac::verify_slice`.
///
/// A missing secret passes everything: local development escape hatch.
pub fn verify_signature(
    body: &[u8],
    signature_header: Option<&str>,
    secret: Option<&SecretString>,
) -> bool {
    let Some(secret) = secret else {
        tracing::warn!(
            event_name = "security.signature.unverified",
            "no webhook secret configured; accepting request without verification"
        );
        return true;
    };

    let Some(header) = signature_header else {
        return false;
    };
    let Some(claimed_hex) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(claimed) = hex::decode(claimed_hex) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&claimed).is_ok()
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimiterConfig {
    pub ceiling: u32,
    pub window_secs: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { ceiling: 30, window_secs: 60 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after_secs: u64,
}

#[derive(Clone, Copy, Debug)]
struct WindowState {
    count: u32,
    window_start: DateTime<Utc>,
}

/// Fixed-window limiter keyed by caller-supplied strings (network origin in
/// one instance, sender id in another). Windows live in an explicit keyed
/// map with a sweep, not process-global state, so tests can construct as
/// many limiters as they need with a manual clock.
pub struct RateLimiter {
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<String, WindowState>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock, windows: Mutex::new(HashMap::new()) }
    }

    /// Counts one request against `key`. The decision is terminal: the gate
    /// never retries on behalf of the caller.
    pub fn check(&self, key: &str) -> RateDecision {
        let now = self.clock.now();
        let window = Duration::seconds(self.config.window_secs as i64);
        let mut windows = self.windows.lock().expect("rate limit table poisoned");

        let state = windows
            .entry(key.to_owned())
            .and_modify(|state| {
                if now - state.window_start >= window {
                    state.count = 0;
                    state.window_start = now;
                }
            })
            .or_insert(WindowState { count: 0, window_start: now });

        if state.count >= self.config.ceiling {
            let elapsed = (now - state.window_start).num_seconds().max(0) as u64;
            return RateDecision {
                allowed: false,
                remaining: 0,
                retry_after_secs: self.config.window_secs.saturating_sub(elapsed),
            };
        }

        state.count += 1;
        RateDecision {
            allowed: true,
            remaining: self.config.ceiling - state.count,
            retry_after_secs: 0,
        }
    }

    /// Drops windows whose period has fully elapsed. Called periodically so
    /// the table does not grow with one entry per sender forever.
    pub fn sweep(&self) {
        let now = self.clock.now();
        let window = Duration::seconds(self.config.window_secs as i64);
        let mut windows = self.windows.lock().expect("rate limit table poisoned");
        windows.retain(|_, state| now - state.window_start < window);
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().expect("rate limit table poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use secrecy::SecretString;

    use crate::clock::ManualClock;

    use super::{verify_signature, RateLimiter, RateLimiterConfig};

    fn limiter_with_clock() -> (RateLimiter, Arc<ManualClock>) {
        let clock =
            Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()));
        let limiter = RateLimiter::new(RateLimiterConfig::default(), clock.clone());
        (limiter, clock)
    }

    #[test]
    fn thirty_first_request_in_window_is_rejected_with_zero_remaining() {
        let (limiter, _clock) = limiter_with_clock();

        for n in 1..=30 {
            let decision = limiter.check("origin-1");
            assert!(decision.allowed, "request {n} should pass");
        }

        let rejected = limiter.check("origin-1");
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert!(rejected.retry_after_secs > 0 && rejected.retry_after_secs <= 60);
    }

    #[test]
    fn request_passes_again_after_window_elapses() {
        let (limiter, clock) = limiter_with_clock();

        for _ in 0..30 {
            limiter.check("origin-1");
        }
        assert!(!limiter.check("origin-1").allowed);

        clock.advance_secs(61);
        assert!(limiter.check("origin-1").allowed);
    }

    #[test]
    fn keys_are_throttled_independently() {
        let (limiter, _clock) = limiter_with_clock();

        for _ in 0..30 {
            limiter.check("origin-1");
        }
        assert!(!limiter.check("origin-1").allowed);
        assert!(limiter.check("origin-2").allowed);
    }

    #[test]
    fn sweep_drops_expired_windows_only() {
        let (limiter, clock) = limiter_with_clock();

        limiter.check("old");
        clock.advance_secs(61);
        limiter.check("fresh");
        limiter.sweep();

        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn signature_matches_only_for_correct_secret() {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let secret = SecretString::from("shared-secret");
        let body = br#"{"entry":[]}"#;

        let mut mac = Hmac::<Sha256>::new_from_slice(b"shared-secret").expect("mac");
        mac.update(body);
        let header = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        assert!(verify_signature(body, Some(&header), Some(&secret)));
        assert!(!verify_signature(body, Some("sha256=deadbeef"), Some(&secret)));
        assert!(!verify_signature(body, None, Some(&secret)));
        assert!(!verify_signature(body, Some("not-a-signature"), Some(&secret)));
    }

    #[test]
    fn missing_secret_passes_everything() {
        assert!(verify_signature(b"anything", None, None));
    }
}
