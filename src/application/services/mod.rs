//! Application services - capability aggregation, load orchestration and the live runtime

pub mod capability_service;
pub mod orchestrator;
pub mod runtime;

pub use capability_service::{CapabilityAggregator, CapabilitySet};
pub use orchestrator::{
    AddonOutcome, LoadOrchestrator, LoadReport, LoadResult, LoadStatus, Phase, DEFAULT_LOAD_TIMEOUT,
};
pub use runtime::{AddonRuntime, LoadedAddon};
