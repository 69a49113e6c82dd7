//! Addon manifest - line-based `key: value` metadata file

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::application::errors::ManifestError;
use crate::domain::entities::AddonDescriptor;

/// File name that marks a directory as an addon
pub const DEFAULT_MANIFEST_NAME: &str = "addon.info";

/// Read and validate the manifest at `path`.
/// Relative paths in the manifest resolve against its directory.
pub fn read_manifest(path: &Path) -> Result<AddonDescriptor, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    parse_manifest(&content, &dir)
}

/// Parse manifest text for the addon living in `dir`
pub fn parse_manifest(content: &str, dir: &Path) -> Result<AddonDescriptor, ManifestError> {
    let mut descriptor = AddonDescriptor::new(dir);

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match key.trim().to_ascii_lowercase().as_str() {
            "author" => descriptor.author = Some(value.to_string()),
            "name" => descriptor.display_name = Some(value.to_string()),
            "version" => descriptor.version = Some(value.to_string()),
            "addonfile" => descriptor.main_file = Some(resolve(dir, value)),
            "commandfile" => descriptor.command_file = Some(resolve(dir, value)),
            "intentconfig" => descriptor.capability_file = Some(resolve(dir, value)),
            "extensions" => descriptor.extensions_path = Some(resolve(dir, value)),
            "priority" => match value.parse::<i64>() {
                Ok(priority) => descriptor.priority = priority,
                Err(_) => warn!(path = %dir.display(), value, "Invalid priority, using 0"),
            },
            "enabled" => match parse_bool(value) {
                Some(enabled) => descriptor.enabled = enabled,
                None => warn!(path = %dir.display(), value, "Invalid enabled flag, using true"),
            },
            _ => {}
        }
    }

    if !descriptor.is_valid() {
        return Err(ManifestError::MissingEntry(dir.to_path_buf()));
    }
    Ok(descriptor)
}

fn resolve(dir: &Path, value: &str) -> PathBuf {
    dir.join(value)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_keys() {
        let content = "\
# ticket system
Author: someone
name: Tickets
VERSION: 1.2.0
addonfile: src/main
commandfile: commands
intentconfig: intents.yaml
extensions: ext
priority: 10
enabled: yes
homepage: https://example.org
";
        let desc = parse_manifest(content, Path::new("/addons/tickets")).unwrap();
        assert_eq!(desc.author.as_deref(), Some("someone"));
        assert_eq!(desc.name(), "Tickets");
        assert_eq!(desc.version.as_deref(), Some("1.2.0"));
        assert_eq!(desc.main_file, Some(PathBuf::from("/addons/tickets/src/main")));
        assert_eq!(desc.command_file, Some(PathBuf::from("/addons/tickets/commands")));
        assert_eq!(desc.capability_file, Some(PathBuf::from("/addons/tickets/intents.yaml")));
        assert_eq!(desc.extensions_path, Some(PathBuf::from("/addons/tickets/ext")));
        assert_eq!(desc.priority, 10);
        assert!(desc.enabled);
    }

    #[test]
    fn value_keeps_everything_after_first_colon() {
        let desc = parse_manifest("addonfile: main\nname: Ops: Alerts", Path::new("/a")).unwrap();
        assert_eq!(desc.display_name.as_deref(), Some("Ops: Alerts"));
    }

    #[test]
    fn missing_entry_files_is_invalid() {
        let err = parse_manifest("name: broken\npriority: 3\n", Path::new("/addons/broken")).unwrap_err();
        assert!(matches!(err, ManifestError::MissingEntry(ref p) if p == Path::new("/addons/broken")));
    }

    #[test]
    fn bad_values_fall_back_to_defaults() {
        let desc = parse_manifest("commandfile: cmds\npriority: high\nenabled: maybe", Path::new("/a")).unwrap();
        assert_eq!(desc.priority, 0);
        assert!(desc.enabled);

        let desc = parse_manifest("addonfile: main\nenabled: FALSE\npriority: -4", Path::new("/a")).unwrap();
        assert!(!desc.enabled);
        assert_eq!(desc.priority, -4);
    }
}
