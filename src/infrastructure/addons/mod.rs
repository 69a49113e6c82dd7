//! Addon discovery and loading
//!
//! Addons are directories holding an `addon.info` manifest. Entry files are
//! resolved through the catalog to compiled-in units or shared libraries.

pub mod capability_file;
pub mod catalog;
pub mod loader;
pub mod manifest;
pub mod scanner;

pub use capability_file::YamlCapabilityReader;
pub use catalog::{AddonCatalog, AddonFactory};
pub use loader::{LibraryLoader, ENTRY_SYMBOL};
pub use manifest::{parse_manifest, read_manifest, DEFAULT_MANIFEST_NAME};
pub use scanner::AddonScanner;
