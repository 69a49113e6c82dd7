//! Runtime messaging - Interaction routing, event bus and request protection

pub mod bus;
pub mod protection;
pub mod router;

pub use bus::{listener, BusStats, EventBus, Listener};
pub use protection::{GuardOptions, ProtectionLayer, RateLimit};
pub use router::{DispatchOutcome, HandlerEntry, HandlerRegistration, InteractionHandler, InteractionRouter};

use std::any::Any;

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
