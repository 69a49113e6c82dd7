//! Domain layer - Core runtime model
//!
//! This layer contains:
//! - Entities: Addon descriptors, commands, interactions, event keys
//! - Traits: Abstractions for infrastructure (Addon, HostConnection, AddonSource)

pub mod entities;
pub mod traits;
