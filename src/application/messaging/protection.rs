//! Protection layer - duplicate-request suppression and per-action rate limiting

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::errors::ProtectionError;

/// Expiry used when a TTL would overflow the clock
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Sliding-window limit for one action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }

    pub fn per_seconds(max_requests: u32, window_secs: u64) -> Self {
        Self::new(max_requests, Duration::from_secs(window_secs))
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::per_seconds(20, 60)
    }
}

/// Per-call switches for [`ProtectionLayer::guard`]
#[derive(Debug, Clone)]
pub struct GuardOptions {
    pub duplicate_check: bool,
    pub rate_limit: bool,
    /// Extra discriminator for the duplicate key, e.g. a ticket id
    pub extra: Option<String>,
    /// Overrides the layer's in-flight TTL for this call
    pub in_flight_ttl: Option<Duration>,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            duplicate_check: true,
            rate_limit: true,
            extra: None,
            in_flight_ttl: None,
        }
    }
}

impl GuardOptions {
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    pub fn with_in_flight_ttl(mut self, ttl: Duration) -> Self {
        self.in_flight_ttl = Some(ttl);
        self
    }

    pub fn without_duplicate_check(mut self) -> Self {
        self.duplicate_check = false;
        self
    }

    pub fn without_rate_limit(mut self) -> Self {
        self.rate_limit = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FlightKey {
    actor: String,
    action: String,
    extra: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RateKey {
    actor: String,
    action: String,
}

struct InFlight {
    token: Uuid,
    expires_at: Instant,
}

struct ProtectionState {
    in_flight: HashMap<FlightKey, InFlight>,
    windows: HashMap<RateKey, VecDeque<Instant>>,
    limits: HashMap<String, RateLimit>,
    last_sweep: Instant,
}

fn lock(state: &Mutex<ProtectionState>) -> MutexGuard<'_, ProtectionState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Releases an in-flight marker when the guarded operation settles
struct InFlightRelease {
    state: Arc<Mutex<ProtectionState>>,
    key: FlightKey,
    token: Uuid,
}

impl Drop for InFlightRelease {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        // The marker may have expired and been claimed by a newer call
        if state.in_flight.get(&self.key).is_some_and(|f| f.token == self.token) {
            state.in_flight.remove(&self.key);
        }
    }
}

/// Shared guard around addon operations
pub struct ProtectionLayer {
    state: Arc<Mutex<ProtectionState>>,
    default_limit: RateLimit,
    in_flight_ttl: Duration,
    sweep_interval: Duration,
}

impl ProtectionLayer {
    pub fn new(default_limit: RateLimit, in_flight_ttl: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProtectionState {
                in_flight: HashMap::new(),
                windows: HashMap::new(),
                limits: HashMap::new(),
                last_sweep: Instant::now(),
            })),
            default_limit,
            in_flight_ttl,
            sweep_interval: Duration::from_secs(60),
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Override the limit for one action for the rest of the process lifetime
    pub fn set_limit(&self, action: impl Into<String>, limit: RateLimit) {
        let action = action.into();
        debug!(action = action.as_str(), max = limit.max_requests, window = ?limit.window, "Rate limit set");
        lock(&self.state).limits.insert(action, limit);
    }

    pub fn limit(&self, action: &str) -> RateLimit {
        lock(&self.state).limits.get(action).copied().unwrap_or(self.default_limit)
    }

    /// Run `operation` unless the call is a duplicate of one in flight or over the
    /// action's rate limit. Both checks happen before `operation` is started.
    pub async fn guard<F, Fut, T>(
        &self,
        actor: &str,
        action: &str,
        options: GuardOptions,
        operation: F,
    ) -> Result<T, ProtectionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let release = self.admit(actor, action, &options)?;
        let output = operation().await;
        drop(release);
        Ok(output)
    }

    fn admit(&self, actor: &str, action: &str, options: &GuardOptions) -> Result<Option<InFlightRelease>, ProtectionError> {
        let now = Instant::now();
        let mut state = lock(&self.state);

        if now.duration_since(state.last_sweep) >= self.sweep_interval {
            self.sweep(&mut state, now);
        }

        let flight_key = FlightKey {
            actor: actor.to_string(),
            action: action.to_string(),
            extra: options.extra.clone(),
        };

        if options.duplicate_check && state.in_flight.get(&flight_key).is_some_and(|f| f.expires_at > now) {
            debug!(actor, action, "Duplicate request rejected");
            return Err(ProtectionError::DuplicateRequest {
                actor: actor.to_string(),
                action: action.to_string(),
            });
        }

        if options.rate_limit {
            let limit = state.limits.get(action).copied().unwrap_or(self.default_limit);
            let times = state
                .windows
                .entry(RateKey {
                    actor: actor.to_string(),
                    action: action.to_string(),
                })
                .or_default();

            // Remove old requests outside the window
            while times.front().is_some_and(|&t| now.duration_since(t) >= limit.window) {
                times.pop_front();
            }

            if times.len() >= limit.max_requests as usize {
                let retry_after = times
                    .front()
                    .map(|t| limit.window.saturating_sub(now.duration_since(*t)))
                    .unwrap_or(limit.window);
                warn!(actor, action, retry_after = ?retry_after, "Rate limit exceeded");
                return Err(ProtectionError::RateLimited {
                    action: action.to_string(),
                    retry_after,
                });
            }

            times.push_back(now);
        }

        if !options.duplicate_check {
            return Ok(None);
        }

        let token = Uuid::new_v4();
        let ttl = options.in_flight_ttl.unwrap_or(self.in_flight_ttl);
        state.in_flight.insert(
            flight_key.clone(),
            InFlight {
                token,
                expires_at: now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE),
            },
        );
        Ok(Some(InFlightRelease {
            state: Arc::clone(&self.state),
            key: flight_key,
            token,
        }))
    }

    fn sweep(&self, state: &mut ProtectionState, now: Instant) {
        let before = state.in_flight.len() + state.windows.len();
        state.in_flight.retain(|_, f| f.expires_at > now);

        let limits = &state.limits;
        let default_limit = self.default_limit;
        state.windows.retain(|key, times| {
            let window = limits.get(&key.action).copied().unwrap_or(default_limit).window;
            times.back().is_some_and(|&t| now.duration_since(t) < window)
        });

        state.last_sweep = now;
        let evicted = before - (state.in_flight.len() + state.windows.len());
        if evicted > 0 {
            debug!(evicted, "Protection records evicted");
        }
    }

    /// Whether a guarded call for this key is currently running
    pub fn is_in_flight(&self, actor: &str, action: &str, extra: Option<&str>) -> bool {
        let key = FlightKey {
            actor: actor.to_string(),
            action: action.to_string(),
            extra: extra.map(str::to_string),
        };
        let now = Instant::now();
        lock(&self.state).in_flight.get(&key).is_some_and(|f| f.expires_at > now)
    }

    /// Number of live protection records
    pub fn tracked_records(&self) -> usize {
        let state = lock(&self.state);
        state.in_flight.len() + state.windows.len()
    }
}

impl Default for ProtectionLayer {
    fn default() -> Self {
        Self::new(RateLimit::default(), Duration::from_secs(30))
    }
}
