//! # Event Bus
//!
//! Synchronous, namespaced publish/subscribe for addon-to-addon messaging.
//!
//! `emit` runs every listener registered for the key, in registration order, on the
//! caller's thread and returns once all of them have returned. Listeners that start
//! asynchronous work (for example with `tokio::spawn`) are not awaited; callers that
//! need completion must arrange their own reply channel.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use super::panic_message;
use crate::application::errors::{BusError, HandlerError};
use crate::domain::entities::EventKey;

/// Listener callable. Identity (for `off`) is the `Arc` pointer.
pub type Listener = Arc<dyn Fn(&Value) -> Result<(), HandlerError> + Send + Sync>;

/// Wrap a closure as a [`Listener`]
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Value) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

struct Subscription {
    id: u64,
    listener: Listener,
    once: bool,
}

#[derive(Default)]
struct BusState {
    subscriptions: HashMap<EventKey, Vec<Subscription>>,
    observed: HashSet<EventKey>,
}

/// Bus statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    /// Distinct keys ever subscribed to or emitted
    pub total_event_keys: usize,
    /// Current listener count per key
    pub listener_counts: BTreeMap<String, usize>,
    /// Emissions since start
    pub total_emissions: u64,
}

/// In-process event bus
#[derive(Default)]
pub struct EventBus {
    state: RwLock<BusState>,
    next_id: AtomicU64,
    emissions: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe for every emission of `key`
    pub fn on(&self, key: &str, listener: Listener) -> Result<(), BusError> {
        self.subscribe(key, listener, false)
    }

    /// Subscribe for the next emission of `key` only
    pub fn once(&self, key: &str, listener: Listener) -> Result<(), BusError> {
        self.subscribe(key, listener, true)
    }

    fn subscribe(&self, key: &str, listener: Listener, once: bool) -> Result<(), BusError> {
        let key: EventKey = key.parse()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.observed.insert(key.clone());
        let subs = state.subscriptions.entry(key.clone()).or_default();
        subs.push(Subscription { id, listener, once });

        debug!(key = %key, once, listeners = subs.len(), "Bus listener added");
        Ok(())
    }

    /// Remove every subscription of `listener` under `key`
    pub fn off(&self, key: &str, listener: &Listener) -> bool {
        let Ok(key) = key.parse::<EventKey>() else {
            return false;
        };
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let Some(subs) = state.subscriptions.get_mut(&key) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| !Arc::ptr_eq(&s.listener, listener));
        let removed = subs.len() != before;
        if subs.is_empty() {
            state.subscriptions.remove(&key);
        }
        removed
    }

    /// Remove every listener for `namespace:event_name`, returning how many were removed
    pub fn off_all(&self, namespace: &str, event_name: &str) -> usize {
        let Ok(key) = EventKey::new(namespace, event_name) else {
            return 0;
        };
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.subscriptions.remove(&key).map(|subs| subs.len()).unwrap_or(0)
    }

    /// Invoke every current listener of `key` with `payload`.
    /// Returns `true` if at least one listener ran.
    pub fn emit(&self, key: &str, payload: &Value) -> bool {
        let key: EventKey = match key.parse() {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Emit with invalid event key ignored");
                return false;
            }
        };
        self.emissions.fetch_add(1, Ordering::Relaxed);

        // Snapshot and drop one-shot subscriptions before running anything, so
        // listeners may subscribe, unsubscribe or emit without deadlocking.
        let snapshot: Vec<(u64, Listener)> = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            state.observed.insert(key.clone());
            match state.subscriptions.get_mut(&key) {
                Some(subs) => {
                    let snapshot = subs.iter().map(|s| (s.id, Arc::clone(&s.listener))).collect();
                    subs.retain(|s| !s.once);
                    if subs.is_empty() {
                        state.subscriptions.remove(&key);
                    }
                    snapshot
                }
                None => Vec::new(),
            }
        };

        if snapshot.is_empty() {
            debug!(key = %key, "Event emitted with no listeners");
            return false;
        }

        for (id, listener) in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(key = %key, subscription = id, error = %e, "Bus listener failed");
                }
                Err(panic) => {
                    warn!(key = %key, subscription = id, error = %panic_message(panic.as_ref()), "Bus listener panicked");
                }
            }
        }

        debug!(key = %key, listeners = snapshot.len(), "Event emitted");
        true
    }

    pub fn listener_count(&self, key: &str) -> usize {
        let Ok(key) = key.parse::<EventKey>() else {
            return 0;
        };
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.subscriptions.get(&key).map(Vec::len).unwrap_or(0)
    }

    pub fn stats(&self) -> BusStats {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        BusStats {
            total_event_keys: state.observed.len(),
            listener_counts: state
                .subscriptions
                .iter()
                .map(|(key, subs)| (key.to_string(), subs.len()))
                .collect(),
            total_emissions: self.emissions.load(Ordering::Relaxed),
        }
    }
}
