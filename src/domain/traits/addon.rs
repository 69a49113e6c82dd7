use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::application::context::AddonContext;
use crate::application::errors::AddonError;
use crate::domain::entities::{CommandDefinition, PlatformEvent};

/// Boxed future returned by lifecycle hooks
pub type HookFuture = Pin<Box<dyn Future<Output = Result<(), AddonError>> + Send>>;

/// Lifecycle hook callable; receives the event payload (`Null` for the ready hook)
pub type HookFn = Arc<dyn Fn(serde_json::Value) -> HookFuture + Send + Sync>;

/// Named hook slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hook {
    Ready,
    Event(PlatformEvent),
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Ready => f.write_str("ready"),
            Hook::Event(event) => write!(f, "{}", event),
        }
    }
}

/// Hook slots an addon fills in at load time. Empty slots are never called.
#[derive(Clone, Default)]
pub struct AddonHooks {
    slots: BTreeMap<Hook, HookFn>,
}

impl AddonHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_ready<F, Fut>(self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), AddonError>> + Send + 'static,
    {
        self.with_slot(Hook::Ready, move |_| hook())
    }

    pub fn on<F, Fut>(self, event: PlatformEvent, hook: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), AddonError>> + Send + 'static,
    {
        self.with_slot(Hook::Event(event), hook)
    }

    fn with_slot<F, Fut>(mut self, slot: Hook, hook: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), AddonError>> + Send + 'static,
    {
        let hook: HookFn = Arc::new(move |payload| -> HookFuture { Box::pin(hook(payload)) });
        self.slots.insert(slot, hook);
        self
    }

    pub fn get(&self, slot: Hook) -> Option<&HookFn> {
        self.slots.get(&slot)
    }

    pub fn has(&self, slot: Hook) -> bool {
        self.slots.contains_key(&slot)
    }

    pub fn declared(&self) -> impl Iterator<Item = Hook> + '_ {
        self.slots.keys().copied()
    }

    /// Merge another unit's hooks; slots already filled keep their first hook
    pub fn merge(&mut self, other: AddonHooks) {
        for (slot, hook) in other.slots {
            self.slots.entry(slot).or_insert(hook);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for AddonHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.slots.keys()).finish()
    }
}

/// An importable addon unit (a resolved `addonfile` or `commandfile`)
#[async_trait]
pub trait Addon: Send + Sync {
    /// Unit name, used in logs
    fn name(&self) -> &str;

    /// Command definitions this unit contributes to the host
    fn commands(&self) -> Vec<CommandDefinition> {
        Vec::new()
    }

    /// Wire the unit into the runtime services and return its hooks
    async fn load(&self, ctx: AddonContext) -> Result<AddonHooks, AddonError>;
}
