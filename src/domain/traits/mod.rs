//! Domain traits - Abstractions for infrastructure implementations

pub mod addon;
pub mod host;
pub mod source;

pub use addon::{Addon, AddonHooks, Hook, HookFn, HookFuture};
pub use host::{HostConnection, HostEvent, HostInfo, HostSession};
pub use source::{AddonSource, CapabilityReader};
