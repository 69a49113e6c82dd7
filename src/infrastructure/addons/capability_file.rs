//! Capability declaration files (`intentconfig`)

use serde::Deserialize;
use std::path::Path;

use crate::application::errors::AddonError;
use crate::domain::traits::CapabilityReader;

/// Either a bare list or a mapping with an `intents` list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CapabilityFile {
    List(Vec<String>),
    Mapping { intents: Vec<String> },
}

/// Reads YAML capability files
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlCapabilityReader;

impl YamlCapabilityReader {
    pub fn parse(content: &str) -> Result<Vec<String>, AddonError> {
        let file: CapabilityFile = serde_yaml::from_str(content)
            .map_err(|e| AddonError::Load(format!("Invalid capability file: {}", e)))?;
        let capabilities = match file {
            CapabilityFile::List(list) => list,
            CapabilityFile::Mapping { intents } => intents,
        };
        Ok(capabilities
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect())
    }
}

impl CapabilityReader for YamlCapabilityReader {
    fn read(&self, path: &Path) -> Result<Vec<String>, AddonError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AddonError::NotFound(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }
}
