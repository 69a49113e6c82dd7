//! Addon loader - loads addon units from shared libraries

use async_trait::async_trait;
use libloading::{Library, Symbol};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::application::context::AddonContext;
use crate::application::errors::AddonError;
use crate::domain::entities::CommandDefinition;
use crate::domain::traits::{Addon, AddonHooks};

/// Symbol every addon library must export
pub const ENTRY_SYMBOL: &[u8] = b"addon_entry";

/// Function signature of the exported entry point
pub type AddonEntryFn = extern "C" fn() -> *mut dyn Addon;

/// A unit living in a shared library; holds the library open
struct LibraryAddon {
    instance: Box<dyn Addon>,
    _library: Arc<Library>,
}

#[async_trait]
impl Addon for LibraryAddon {
    fn name(&self) -> &str {
        self.instance.name()
    }

    fn commands(&self) -> Vec<CommandDefinition> {
        self.instance.commands()
    }

    async fn load(&self, ctx: AddonContext) -> Result<AddonHooks, AddonError> {
        self.instance.load(ctx).await
    }
}

/// Loads shared libraries. Every library stays loaded for the loader's
/// lifetime, since hooks handed out by an addon point into its code.
#[derive(Default)]
pub struct LibraryLoader {
    libraries: Mutex<Vec<(PathBuf, Arc<Library>)>>,
}

impl LibraryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library file for an entry: the path itself, or with the platform extension
    pub fn library_path(entry: &Path) -> Option<PathBuf> {
        if entry.is_file() {
            return Some(entry.to_path_buf());
        }
        let with_ext = entry.with_extension(std::env::consts::DLL_EXTENSION);
        with_ext.is_file().then_some(with_ext)
    }

    pub fn load(&self, entry: &Path) -> Result<Arc<dyn Addon>, AddonError> {
        let path = Self::library_path(entry)
            .ok_or_else(|| AddonError::NotFound(format!("Library not found: {}", entry.display())))?;

        let library = unsafe {
            Library::new(&path)
                .map_err(|e| AddonError::Load(format!("Failed to load library {}: {}", path.display(), e)))?
        };

        let instance = unsafe {
            let entry_fn: Symbol<AddonEntryFn> = library
                .get(ENTRY_SYMBOL)
                .map_err(|e| AddonError::Load(format!("Missing addon_entry in {}: {}", path.display(), e)))?;
            let raw = entry_fn();
            if raw.is_null() {
                return Err(AddonError::Load(format!("addon_entry returned null in {}", path.display())));
            }
            Box::from_raw(raw)
        };

        let library = Arc::new(library);
        self.libraries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((path.clone(), Arc::clone(&library)));

        tracing::info!(unit = instance.name(), library = %path.display(), "Loaded addon library");
        Ok(Arc::new(LibraryAddon {
            instance,
            _library: library,
        }))
    }

    pub fn loaded(&self) -> Vec<PathBuf> {
        self.libraries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }
}
