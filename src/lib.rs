//! addon-host - addon runtime for chat-bot hosts
//!
//! Discovers addons on disk, aggregates their capability requests, loads them
//! in priority order and provides the interaction router, event bus and
//! protection layer they share.

pub mod application;
pub mod domain;
pub mod infrastructure;
