//! Services handed to each addon at load time

use std::future::Future;
use std::sync::Arc;

use crate::application::errors::{HandlerError, ProtectionError, RouterError};
use crate::application::messaging::{EventBus, GuardOptions, HandlerRegistration, InteractionRouter, ProtectionLayer};
use crate::application::services::CapabilityAggregator;
use crate::domain::entities::{AddonDescriptor, Interaction, InteractionKind, MatchStrategy};

/// The process-wide coordination services, owned by the orchestrator
#[derive(Clone)]
pub struct RuntimeServices {
    pub router: Arc<InteractionRouter>,
    pub bus: Arc<EventBus>,
    pub protection: Arc<ProtectionLayer>,
    pub capabilities: Arc<CapabilityAggregator>,
}

impl RuntimeServices {
    pub fn new(protection: ProtectionLayer) -> Self {
        Self {
            router: Arc::new(InteractionRouter::new()),
            bus: Arc::new(EventBus::new()),
            protection: Arc::new(protection),
            capabilities: Arc::new(CapabilityAggregator::new()),
        }
    }
}

impl Default for RuntimeServices {
    fn default() -> Self {
        Self::new(ProtectionLayer::default())
    }
}

/// Per-addon view of the runtime services
#[derive(Clone)]
pub struct AddonContext {
    descriptor: Arc<AddonDescriptor>,
    name: String,
    services: RuntimeServices,
}

impl AddonContext {
    pub fn new(descriptor: Arc<AddonDescriptor>, services: RuntimeServices) -> Self {
        let name = descriptor.name();
        Self {
            descriptor,
            name,
            services,
        }
    }

    pub fn addon_name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &AddonDescriptor {
        &self.descriptor
    }

    pub fn router(&self) -> &InteractionRouter {
        &self.services.router
    }

    pub fn bus(&self) -> &EventBus {
        &self.services.bus
    }

    pub fn protection(&self) -> &ProtectionLayer {
        &self.services.protection
    }

    pub fn services(&self) -> &RuntimeServices {
        &self.services
    }

    /// Register an interaction handler attributed to this addon
    pub fn register_interaction<F>(
        &self,
        kind: InteractionKind,
        pattern: impl Into<String>,
        strategy: MatchStrategy,
        priority: i32,
        handler: F,
    ) -> Result<(), RouterError>
    where
        F: Fn(&Interaction) -> Result<bool, HandlerError> + Send + Sync + 'static,
    {
        self.services.router.register(
            HandlerRegistration::new(kind, pattern, strategy, handler)
                .with_priority(priority)
                .with_source(self.name.clone()),
        )
    }

    /// Ask for a capability after load; only succeeds if already granted
    pub fn request_capability(&self, capability: &str) -> bool {
        self.services.capabilities.request(capability, &self.name)
    }

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
        self.services.protection.guard(actor, action, options, operation).await
    }
}
