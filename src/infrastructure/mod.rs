//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Addons: Discovery, manifests, capability files and unit loading
//! - Config: Configuration loading
//! - Database: Embedded SQLite for addon schema files
//! - Adapters: Host integrations (console)

pub mod adapters;
pub mod addons;
pub mod config;
pub mod database;
