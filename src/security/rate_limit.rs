//! Fixed-window rate limiting keyed by client identity and route class.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;

use crate::config::{LimitConfig, RateLimitConfig};
use crate::routing::RouteClass;

/// Outcome of a single limiter hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Maximum requests per window.
    pub limit: u32,
    /// Requests left in the current window (0 when denied).
    pub remaining: u32,
    /// Seconds until the window resets (0 when allowed).
    pub retry_after_secs: u64,
}

/// The counter store could not answer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rate limit store unavailable: {0}")]
    Unavailable(String),
}

/// Backing store for fixed-window counters.
///
/// `hit` must check and increment atomically for a given key.
pub trait RateLimitStore: Send + Sync {
    fn hit(&self, key: &str, limit: &LimitConfig, now: Instant) -> Result<RateDecision, StoreError>;

    /// Number of live windows (diagnostics).
    fn window_count(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Process-local store. Windows are not shared across instances.
pub struct MemoryStore {
    windows: DashMap<String, Window>,
    sweep_interval: Duration,
    last_sweep: Mutex<Option<Instant>>,
}

impl MemoryStore {
    /// `sweep_interval` bounds how often expired windows are purged; zero
    /// sweeps on every hit.
    pub fn new(sweep_interval: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            sweep_interval,
            last_sweep: Mutex::new(None),
        }
    }

    /// Drop windows whose reset time has passed, at most once per interval.
    fn maybe_sweep(&self, now: Instant) {
        // Another thread already sweeping is as good as sweeping ourselves.
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        let due = match *last {
            Some(at) => now.saturating_duration_since(at) >= self.sweep_interval,
            None => true,
        };
        if !due {
            return;
        }
        *last = Some(now);
        drop(last);

        let before = self.windows.len();
        self.windows.retain(|_, window| window.reset_at > now);
        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.windows.len(), "Swept expired rate limit windows");
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl RateLimitStore for MemoryStore {
    fn hit(&self, key: &str, limit: &LimitConfig, now: Instant) -> Result<RateDecision, StoreError> {
        self.maybe_sweep(now);

        let window_len = Duration::from_secs(limit.window_secs);
        let max = limit.max_requests;

        // The entry guard holds the shard lock: check and increment are atomic.
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: now,
        });
        let window = entry.value_mut();

        if window.count == 0 || window.reset_at <= now {
            let reset_at = now.checked_add(window_len).ok_or_else(|| {
                StoreError::Unavailable(format!("window of {}s overflows the clock", limit.window_secs))
            })?;
            *window = Window { count: 1, reset_at };
            return Ok(RateDecision {
                allowed: true,
                limit: max,
                remaining: max.saturating_sub(1),
                retry_after_secs: 0,
            });
        }

        if window.count < max {
            window.count += 1;
            return Ok(RateDecision {
                allowed: true,
                limit: max,
                remaining: max - window.count,
                retry_after_secs: 0,
            });
        }

        let wait = window.reset_at.saturating_duration_since(now);
        Ok(RateDecision {
            allowed: false,
            limit: max,
            remaining: 0,
            retry_after_secs: ceil_secs(wait),
        })
    }

    fn window_count(&self) -> usize {
        self.windows.len()
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Per-class limits bound to a shared store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    enabled: bool,
    auth: LimitConfig,
    api: LimitConfig,
    ai: LimitConfig,
    upload: LimitConfig,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.enabled)
            .field("windows", &self.store.window_count())
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            enabled: config.enabled,
            auth: config.auth,
            api: config.api,
            ai: config.ai,
            upload: config.upload,
        }
    }

    /// Limit applied to a route class, if any.
    pub fn limit_for(&self, class: RouteClass) -> Option<LimitConfig> {
        match class {
            RouteClass::Auth => Some(self.auth),
            RouteClass::Ai => Some(self.ai),
            RouteClass::Upload => Some(self.upload),
            RouteClass::Api => Some(self.api),
            RouteClass::Public | RouteClass::Page => None,
        }
    }

    /// Count a request from `client` against its class window.
    ///
    /// Returns `Ok(None)` when limiting is disabled or the class is unlimited.
    pub fn check(&self, class: RouteClass, client: &str) -> Result<Option<RateDecision>, StoreError> {
        self.check_at(class, client, Instant::now())
    }

    pub fn check_at(
        &self,
        class: RouteClass,
        client: &str,
        now: Instant,
    ) -> Result<Option<RateDecision>, StoreError> {
        if !self.enabled {
            return Ok(None);
        }
        let Some(limit) = self.limit_for(class) else {
            return Ok(None);
        };
        let key = format!("{}:{}", class.as_str(), client);
        self.store.hit(&key, &limit, now).map(Some)
    }

    pub fn store(&self) -> &Arc<dyn RateLimitStore> {
        &self.store
    }
}
