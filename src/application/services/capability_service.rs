//! Capability aggregation - merges the intents every addon needs before the host connects

use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::domain::entities::AddonTree;
use crate::domain::traits::CapabilityReader;

/// Frozen, de-duplicated capability set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilitySet {
    pub capabilities: BTreeSet<String>,
    /// Capability -> addon that asked for it first
    pub first_requested_by: BTreeMap<String, String>,
}

impl CapabilitySet {
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Collects capability requests until the host connection is created
#[derive(Default)]
pub struct CapabilityAggregator {
    /// Capability -> requesting addons in request order
    requests: Mutex<BTreeMap<String, Vec<String>>>,
    frozen: OnceCell<CapabilitySet>,
    granted: RwLock<BTreeSet<String>>,
}

impl CapabilityAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every addon's capability file in the tree, parents first.
    /// Returns the number of files read successfully.
    pub fn collect(&self, tree: &AddonTree, reader: &dyn CapabilityReader) -> usize {
        let mut read = 0;
        for descriptor in tree.descriptors() {
            let Some(ref file) = descriptor.capability_file else {
                continue;
            };
            let addon = descriptor.name();
            match reader.read(file) {
                Ok(capabilities) => {
                    read += 1;
                    for capability in capabilities {
                        self.request(&capability, &addon);
                    }
                }
                Err(e) => {
                    warn!(addon = addon.as_str(), file = %file.display(), error = %e, "Failed to read capability file");
                }
            }
        }
        read
    }

    /// Request a capability on behalf of `addon`.
    ///
    /// Before [`finalize`](Self::finalize) the request is recorded and `true` is returned.
    /// Afterwards the set is closed: the call returns `true` only if the connection
    /// already grants the capability, and otherwise logs a warning and returns `false`.
    pub fn request(&self, capability: &str, addon: &str) -> bool {
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());

        if self.frozen.get().is_some() {
            drop(requests);
            if self.is_granted(capability) {
                debug!(addon, capability, "Late capability request already granted");
                return true;
            }
            warn!(
                addon,
                capability,
                "Capability requested after the host connection opened; it will not be granted"
            );
            return false;
        }

        let requesters = requests.entry(capability.to_string()).or_default();
        if !requesters.iter().any(|r| r == addon) {
            requesters.push(addon.to_string());
        }
        debug!(addon, capability, "Capability requested");
        true
    }

    /// Freeze the set. Later calls return the same set.
    pub fn finalize(&self) -> CapabilitySet {
        let requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        let set = self.frozen.get_or_init(|| {
            let set = CapabilitySet {
                capabilities: requests.keys().cloned().collect(),
                first_requested_by: requests
                    .iter()
                    .filter_map(|(cap, addons)| addons.first().map(|a| (cap.clone(), a.clone())))
                    .collect(),
            };
            info!(count = set.len(), "Capability set finalized");
            set
        });
        self.granted
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend(set.capabilities.iter().cloned());
        set.clone()
    }

    /// Record what the host actually granted, which may exceed the request
    pub fn record_granted<I>(&self, granted: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.granted.write().unwrap_or_else(|e| e.into_inner()).extend(granted);
    }

    pub fn is_granted(&self, capability: &str) -> bool {
        self.granted
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(capability)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get().is_some()
    }

    /// Addons that requested `capability`, in request order
    pub fn requesters(&self, capability: &str) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(capability)
            .cloned()
            .unwrap_or_default()
    }
}
