//! Host-keyed circuit breaker for download endpoints
//!
//! Repeated failures against the same host open the breaker for that host;
//! while open, fetches fail fast without touching the network. State is
//! process-wide and shared across concurrent fetches.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Consecutive failures before the breaker opens
pub const FAILURE_THRESHOLD: u32 = 5;

/// How long an open breaker rejects calls before allowing a probe
pub const RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

static BREAKERS: Lazy<Mutex<HashMap<String, BreakerState>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Extract the host portion of a URL for breaker keying
fn host_of(url: &str) -> String {
    url.split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or(url)
        .to_string()
}

/// Check whether the breaker allows a call to the given URL
///
/// Returns `Error::CircuitOpen` while the host's breaker is open. After the
/// recovery timeout the breaker half-opens: the next call is allowed through
/// as a probe, and its outcome decides whether the breaker closes or reopens.
pub fn check(url: &str) -> Result<()> {
    let host = host_of(url);
    let mut breakers = BREAKERS.lock().expect("breaker lock poisoned");
    let state = breakers.entry(host.clone()).or_default();

    if let Some(opened_at) = state.opened_at {
        let elapsed = opened_at.elapsed();
        if elapsed < RECOVERY_TIMEOUT {
            let retry_after = RECOVERY_TIMEOUT - elapsed;
            tracing::debug!(host = %host, "Circuit breaker open, failing fast");
            return Err(Error::CircuitOpen {
                host,
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }
        // Half-open: allow one probe through
        tracing::debug!(host = %host, "Circuit breaker half-open, allowing probe");
        state.opened_at = None;
        state.consecutive_failures = FAILURE_THRESHOLD - 1;
    }

    Ok(())
}

/// Record a successful call, closing the host's breaker
pub fn record_success(url: &str) {
    let host = host_of(url);
    let mut breakers = BREAKERS.lock().expect("breaker lock poisoned");
    if let Some(state) = breakers.get_mut(&host) {
        state.consecutive_failures = 0;
        state.opened_at = None;
    }
}

/// Record a failed call, opening the breaker once the threshold is reached
pub fn record_failure(url: &str) {
    let host = host_of(url);
    let mut breakers = BREAKERS.lock().expect("breaker lock poisoned");
    let state = breakers.entry(host.clone()).or_default();
    state.consecutive_failures += 1;

    if state.consecutive_failures >= FAILURE_THRESHOLD && state.opened_at.is_none() {
        tracing::warn!(
            host = %host,
            failures = state.consecutive_failures,
            "Circuit breaker opened"
        );
        state.opened_at = Some(Instant::now());
    }
}

/// Reset all breaker state
///
/// Test hook; production code never needs to clear the table.
pub fn reset() {
    BREAKERS.lock().expect("breaker lock poisoned").clear();
}
