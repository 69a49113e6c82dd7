use std::path::Path;
use std::sync::Arc;

use crate::application::errors::AddonError;
use crate::domain::entities::AddonDescriptor;
use crate::domain::traits::Addon;

/// Resolves ("imports") an addon entry file into a loadable unit
pub trait AddonSource: Send + Sync {
    fn resolve(&self, descriptor: &AddonDescriptor, entry: &Path) -> Result<Arc<dyn Addon>, AddonError>;
}

/// Reads the capability identifiers an addon declares
pub trait CapabilityReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<String>, AddonError>;
}
