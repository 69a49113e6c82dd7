//! Discovery scanner - walks the addons directory and builds the addon tree

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::manifest::{read_manifest, DEFAULT_MANIFEST_NAME};
use crate::domain::entities::{sort_siblings, AddonNode, AddonTree};

/// Directories that never hold addons
const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "vendor", "__pycache__"];

/// Addon discovery scanner
#[derive(Debug, Clone)]
pub struct AddonScanner {
    manifest_name: String,
}

impl AddonScanner {
    pub fn new() -> Self {
        Self {
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
        }
    }

    pub fn with_manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = name.into();
        self
    }

    pub fn manifest_name(&self) -> &str {
        &self.manifest_name
    }

    /// Discover every addon under `root`. Never fails: invalid addons are
    /// logged and left out.
    pub fn scan(&self, root: &Path) -> AddonTree {
        let root = match root.canonicalize() {
            Ok(root) if root.is_dir() => root,
            _ => {
                warn!(root = %root.display(), "Addons directory does not exist");
                return AddonTree::default();
            }
        };

        info!(root = %root.display(), "Scanning for addons");
        let mut visited = HashSet::new();
        visited.insert(root.clone());
        AddonTree::new(self.scan_dir(&root, &mut visited))
    }

    fn scan_dir(&self, dir: &Path, visited: &mut HashSet<PathBuf>) -> Vec<AddonNode> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to read addon directory");
                return Vec::new();
            }
        };

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to read directory entry");
                    None
                }
            })
            .filter(|path| path.is_dir() && !is_skipped(path))
            .collect();
        candidates.sort();

        let mut nodes = Vec::new();
        for path in candidates {
            let manifest_path = path.join(&self.manifest_name);
            if !manifest_path.is_file() {
                debug!(path = %path.display(), "No manifest, skipping");
                continue;
            }

            let descriptor = match read_manifest(&manifest_path) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Invalid addon manifest, skipping");
                    continue;
                }
            };

            let children = match descriptor.extensions_path {
                Some(ref extensions) => self.scan_extensions(extensions, visited),
                None => Vec::new(),
            };

            if descriptor.enabled {
                debug!(addon = descriptor.name().as_str(), priority = descriptor.priority, "Addon discovered");
                nodes.push(AddonNode::new(descriptor).with_children(children));
            } else {
                info!(addon = descriptor.name().as_str(), "Addon disabled");
                // enabled extensions of a disabled addon take its place
                nodes.extend(children);
            }
        }

        sort_siblings(&mut nodes);
        nodes
    }

    fn scan_extensions(&self, path: &Path, visited: &mut HashSet<PathBuf>) -> Vec<AddonNode> {
        let canonical = match path.canonicalize() {
            Ok(p) if p.is_dir() => p,
            _ => {
                warn!(path = %path.display(), "Extensions directory does not exist");
                return Vec::new();
            }
        };
        if !visited.insert(canonical.clone()) {
            warn!(path = %canonical.display(), "Extensions directory already scanned, skipping");
            return Vec::new();
        }
        self.scan_dir(&canonical, visited)
    }
}

impl Default for AddonScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn is_skipped(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.starts_with('.') || SKIPPED_DIRS.contains(&name),
        None => true,
    }
}
