use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::application::errors::HostError;
use crate::domain::entities::{CommandDefinition, Interaction, PlatformEvent};

/// Host connection - abstraction over the chat platform session
#[async_trait]
pub trait HostConnection: Send + Sync {
    /// Open the connection requesting the given capabilities
    async fn connect(&self, capabilities: &BTreeSet<String>) -> Result<HostSession, HostError>;

    /// Register command definitions with the platform
    async fn register_commands(&self, commands: &[CommandDefinition]) -> Result<(), HostError>;

    /// Next inbound event, `None` once the connection is closed
    async fn next_event(&self) -> Option<HostEvent>;

    /// Get host info
    fn host_info(&self) -> HostInfo;
}

/// Result of a successful connection
#[derive(Debug, Clone, Default)]
pub struct HostSession {
    /// Everything the platform granted, which may exceed what was requested
    pub granted: BTreeSet<String>,
}

/// Inbound traffic from the platform
#[derive(Debug, Clone)]
pub enum HostEvent {
    Interaction(Interaction),
    Platform {
        event: PlatformEvent,
        payload: serde_json::Value,
    },
}

/// Host information
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub id: String,
    pub name: String,
}
