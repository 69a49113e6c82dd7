//! Addon catalog - resolves manifest entry files to loadable units

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::debug;

use super::loader::LibraryLoader;
use crate::application::errors::AddonError;
use crate::domain::entities::AddonDescriptor;
use crate::domain::traits::{Addon, AddonSource};

/// Builds a unit for the addon that references it
pub type AddonFactory = Arc<dyn Fn(&AddonDescriptor) -> Result<Arc<dyn Addon>, AddonError> + Send + Sync>;

/// Registry of compiled-in addon units, with optional shared-library fallback.
///
/// Entries are looked up as `<addon dir name>/<entry>` first, then `<entry>`,
/// where `<entry>` is the manifest path relative to the addon directory.
pub struct AddonCatalog {
    factories: RwLock<HashMap<String, AddonFactory>>,
    libraries: Option<LibraryLoader>,
}

impl AddonCatalog {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            libraries: None,
        }
    }

    /// Fall back to loading entry files as shared libraries
    pub fn with_dynamic_loading(mut self) -> Self {
        self.libraries = Some(LibraryLoader::new());
        self
    }

    pub fn register<F>(&self, key: impl Into<String>, factory: F)
    where
        F: Fn(&AddonDescriptor) -> Result<Arc<dyn Addon>, AddonError> + Send + Sync + 'static,
    {
        let key = key.into();
        debug!(key = key.as_str(), "Addon factory registered");
        self.factories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, Arc::new(factory));
    }

    /// Register a shared unit instance under `key`
    pub fn register_addon(&self, key: impl Into<String>, addon: Arc<dyn Addon>) {
        self.register(key, move |_| Ok(Arc::clone(&addon)));
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    fn lookup_keys(descriptor: &AddonDescriptor, entry: &Path) -> Vec<String> {
        let relative = entry.strip_prefix(&descriptor.absolute_path).unwrap_or(entry);
        let relative = relative.to_string_lossy().replace('\\', "/");
        let dir = descriptor
            .absolute_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        vec![format!("{}/{}", dir, relative), relative]
    }
}

impl Default for AddonCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl AddonSource for AddonCatalog {
    fn resolve(&self, descriptor: &AddonDescriptor, entry: &Path) -> Result<Arc<dyn Addon>, AddonError> {
        let keys = Self::lookup_keys(descriptor, entry);
        let factory = {
            let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
            keys.iter().find_map(|key| factories.get(key).cloned())
        };

        if let Some(factory) = factory {
            return factory(descriptor);
        }
        if let Some(ref libraries) = self.libraries {
            return libraries.load(entry);
        }
        Err(AddonError::NotFound(format!(
            "{} (looked up {})",
            entry.display(),
            keys.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::AddonContext;
    use crate::domain::traits::AddonHooks;
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Addon for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn load(&self, _ctx: AddonContext) -> Result<AddonHooks, AddonError> {
            Ok(AddonHooks::new())
        }
    }

    fn descriptor() -> AddonDescriptor {
        AddonDescriptor::new("/addons/tickets").with_main_file("/addons/tickets/src/main")
    }

    #[test]
    fn qualified_key_wins_over_bare_entry() {
        let catalog = AddonCatalog::new();
        catalog.register_addon("src/main", Arc::new(Named("bare")));
        catalog.register_addon("tickets/src/main", Arc::new(Named("qualified")));

        let unit = catalog.resolve(&descriptor(), Path::new("/addons/tickets/src/main")).unwrap();
        assert_eq!(unit.name(), "qualified");
        assert_eq!(catalog.keys(), vec!["src/main", "tickets/src/main"]);
    }

    #[test]
    fn factories_see_the_descriptor() {
        let catalog = AddonCatalog::new();
        catalog.register("src/main", |desc: &AddonDescriptor| {
            assert_eq!(desc.name(), "tickets");
            Ok(Arc::new(Named("made")) as Arc<dyn Addon>)
        });
        assert!(catalog.resolve(&descriptor(), Path::new("/addons/tickets/src/main")).is_ok());
    }

    #[test]
    fn unknown_entry_is_not_found() {
        let catalog = AddonCatalog::new();
        let err = catalog.resolve(&descriptor(), Path::new("/addons/tickets/src/main")).err().unwrap();
        assert!(matches!(err, AddonError::NotFound(_)));

        let dynamic = AddonCatalog::new().with_dynamic_loading();
        let err = dynamic.resolve(&descriptor(), Path::new("/addons/tickets/src/main")).err().unwrap();
        assert!(matches!(err, AddonError::NotFound(_)));
    }
}
