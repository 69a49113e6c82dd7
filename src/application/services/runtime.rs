//! Addon runtime - live hooks and the host event loop

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::application::context::RuntimeServices;
use crate::application::errors::AddonError;
use crate::application::messaging::{panic_message, DispatchOutcome};
use crate::domain::entities::{AddonDescriptor, Interaction, PlatformEvent};
use crate::domain::traits::{AddonHooks, Hook, HostConnection, HostEvent};

/// How a spawned addon task ended
#[derive(Debug)]
pub(crate) enum Settled<T> {
    Done(T),
    Failed(String),
    TimedOut,
}

/// `now + timeout`, saturating at a far-future instant instead of overflowing
pub(crate) fn deadline_after(now: Instant, timeout: Duration) -> Instant {
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86400 * 365 * 30))
}

/// Wait for `handle` until `deadline`, aborting it on timeout
pub(crate) async fn settle<T>(mut handle: JoinHandle<Result<T, AddonError>>, deadline: Instant) -> Settled<T> {
    match tokio::time::timeout_at(deadline, &mut handle).await {
        Ok(Ok(Ok(value))) => Settled::Done(value),
        Ok(Ok(Err(e))) => Settled::Failed(e.to_string()),
        Ok(Err(join_err)) if join_err.is_panic() => {
            Settled::Failed(format!("panicked: {}", panic_message(join_err.into_panic().as_ref())))
        }
        Ok(Err(join_err)) => Settled::Failed(join_err.to_string()),
        Err(_) => {
            handle.abort();
            Settled::TimedOut
        }
    }
}

/// An addon that finished loading
#[derive(Debug, Clone)]
pub struct LoadedAddon {
    pub name: String,
    pub descriptor: Arc<AddonDescriptor>,
    pub hooks: AddonHooks,
}

/// Everything the process needs after loading: services plus live hooks
pub struct AddonRuntime {
    services: RuntimeServices,
    addons: Vec<LoadedAddon>,
    hook_timeout: Duration,
}

impl AddonRuntime {
    pub fn new(services: RuntimeServices, addons: Vec<LoadedAddon>, hook_timeout: Duration) -> Self {
        Self {
            services,
            addons,
            hook_timeout,
        }
    }

    pub fn services(&self) -> &RuntimeServices {
        &self.services
    }

    pub fn addons(&self) -> &[LoadedAddon] {
        &self.addons
    }

    pub fn addon_names(&self) -> Vec<&str> {
        self.addons.iter().map(|a| a.name.as_str()).collect()
    }

    /// Run `slot` on every addon that declared it, concurrently.
    /// Failures and timeouts are logged per addon; returns how many succeeded.
    async fn invoke_slot(&self, slot: Hook, payload: Value) -> usize {
        let deadline = deadline_after(Instant::now(), self.hook_timeout);
        let pending: Vec<(&str, JoinHandle<Result<(), AddonError>>)> = self
            .addons
            .iter()
            .filter_map(|addon| {
                let hook = addon.hooks.get(slot)?;
                Some((addon.name.as_str(), tokio::spawn(hook(payload.clone()))))
            })
            .collect();

        let mut succeeded = 0;
        for (name, handle) in pending {
            match settle(handle, deadline).await {
                Settled::Done(()) => {
                    succeeded += 1;
                    debug!(addon = name, hook = %slot, "Hook completed");
                }
                Settled::Failed(reason) => {
                    warn!(addon = name, hook = %slot, error = reason.as_str(), "Hook failed");
                }
                Settled::TimedOut => {
                    warn!(addon = name, hook = %slot, timeout = ?self.hook_timeout, "Hook timed out");
                }
            }
        }
        succeeded
    }

    /// Invoke every declared ready hook once
    pub async fn invoke_ready(&self) -> usize {
        self.invoke_slot(Hook::Ready, Value::Null).await
    }

    /// Deliver a platform event to every addon hooked on it
    pub async fn dispatch_platform_event(&self, event: PlatformEvent, payload: Value) -> usize {
        self.invoke_slot(Hook::Event(event), payload).await
    }

    pub fn dispatch_interaction(&self, interaction: &Interaction) -> DispatchOutcome {
        self.services.router.dispatch(interaction)
    }

    pub async fn handle_event(&self, event: HostEvent) {
        match event {
            HostEvent::Interaction(interaction) => {
                let outcome = self.dispatch_interaction(&interaction);
                debug!(kind = %interaction.kind, id = interaction.custom_id.as_str(), outcome = ?outcome, "Interaction dispatched");
            }
            HostEvent::Platform { event, payload } => {
                let handled = self.dispatch_platform_event(event, payload).await;
                debug!(event = %event, handled, "Platform event dispatched");
            }
        }
    }

    /// Serve host events until the connection closes; returns the number handled
    pub async fn serve(&self, host: &dyn HostConnection) -> usize {
        let mut handled = 0;
        while let Some(event) = host.next_event().await {
            self.handle_event(event).await;
            handled += 1;
        }
        info!(events = handled, "Host connection closed");
        handled
    }
}
