//! Application layer - Runtime services and startup orchestration
//!
//! This layer contains:
//! - Context: Services handed to addons at load time
//! - Errors: Error types for every component
//! - Messaging: Interaction routing, event bus and request protection
//! - Services: Capability aggregation, load orchestration, live runtime

pub mod context;
pub mod errors;
pub mod messaging;
pub mod services;
