use serde::Serialize;
use std::path::{Path, PathBuf};

/// One discovered addon, as described by its manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddonDescriptor {
    pub author: Option<String>,
    pub display_name: Option<String>,
    pub version: Option<String>,
    pub main_file: Option<PathBuf>,
    pub command_file: Option<PathBuf>,
    pub capability_file: Option<PathBuf>,
    pub extensions_path: Option<PathBuf>,
    pub priority: i64,
    pub enabled: bool,
    pub absolute_path: PathBuf,
}

impl AddonDescriptor {
    pub fn new(absolute_path: impl Into<PathBuf>) -> Self {
        Self {
            author: None,
            display_name: None,
            version: None,
            main_file: None,
            command_file: None,
            capability_file: None,
            extensions_path: None,
            priority: 0,
            enabled: true,
            absolute_path: absolute_path.into(),
        }
    }

    pub fn with_main_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.main_file = Some(file.into());
        self
    }

    pub fn with_command_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.command_file = Some(file.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name used in logs: the declared name, else the directory name
    pub fn name(&self) -> String {
        if let Some(ref name) = self.display_name {
            return name.clone();
        }
        self.absolute_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.absolute_path.display().to_string())
    }

    /// Entry files to import, main file first, without duplicates
    pub fn entry_files(&self) -> Vec<&Path> {
        let mut entries: Vec<&Path> = Vec::new();
        for file in [&self.main_file, &self.command_file].into_iter().flatten() {
            if !entries.contains(&file.as_path()) {
                entries.push(file.as_path());
            }
        }
        entries
    }

    pub fn is_valid(&self) -> bool {
        self.main_file.is_some() || self.command_file.is_some()
    }
}

/// An addon and the extensions nested beneath it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddonNode {
    pub descriptor: AddonDescriptor,
    pub children: Vec<AddonNode>,
}

impl AddonNode {
    pub fn new(descriptor: AddonDescriptor) -> Self {
        Self {
            descriptor,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<AddonNode>) -> Self {
        self.children = children;
        self
    }
}

/// Siblings sharing one priority value
#[derive(Debug)]
pub struct PriorityGroup<'a> {
    pub priority: i64,
    pub members: Vec<&'a AddonNode>,
}

/// Sort siblings into load order: priority descending, then path ascending
pub fn sort_siblings(nodes: &mut [AddonNode]) {
    nodes.sort_by(|a, b| {
        b.descriptor
            .priority
            .cmp(&a.descriptor.priority)
            .then_with(|| a.descriptor.absolute_path.cmp(&b.descriptor.absolute_path))
    });
}

/// Split already-sorted siblings into groups, highest priority first
pub fn priority_groups(nodes: &[AddonNode]) -> Vec<PriorityGroup<'_>> {
    let mut groups: Vec<PriorityGroup<'_>> = Vec::new();
    for node in nodes {
        match groups.last_mut() {
            Some(group) if group.priority == node.descriptor.priority => group.members.push(node),
            _ => groups.push(PriorityGroup {
                priority: node.descriptor.priority,
                members: vec![node],
            }),
        }
    }
    groups
}

/// Forest of discovered addons
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddonTree {
    pub roots: Vec<AddonNode>,
}

impl AddonTree {
    pub fn new(mut roots: Vec<AddonNode>) -> Self {
        sort_siblings(&mut roots);
        Self { roots }
    }

    /// All descriptors, parents before their children
    pub fn descriptors(&self) -> Vec<&AddonDescriptor> {
        fn walk<'a>(nodes: &'a [AddonNode], out: &mut Vec<&'a AddonDescriptor>) {
            for node in nodes {
                out.push(&node.descriptor);
                walk(&node.children, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.roots, &mut out);
        out
    }

    pub fn len(&self) -> usize {
        self.descriptors().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&AddonDescriptor> {
        self.descriptors().into_iter().find(|d| d.name() == name)
    }
}
