use serde::{Deserialize, Serialize};

/// A command an addon asks the host to register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDefinition {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub usage: Option<String>,
}

impl CommandDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            aliases: Vec::new(),
            usage: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn matches(&self, input: &str) -> bool {
        let input_lower = input.to_lowercase();
        self.name.to_lowercase() == input_lower
            || self.aliases.iter().any(|a| a.to_lowercase() == input_lower)
    }
}

/// Commands collected from every addon, in registration order
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: Vec<(String, CommandDefinition)>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition on behalf of `source`; the first addon to claim a name keeps it.
    /// Aliases already taken as a name or alias are dropped from the new definition.
    pub fn register(&mut self, source: &str, mut command: CommandDefinition) -> bool {
        if let Some(owner) = self.claimed_by(&command.name) {
            tracing::warn!(
                addon = source,
                owner,
                command = command.name.as_str(),
                "Command already registered, ignoring duplicate"
            );
            return false;
        }

        let mut aliases = Vec::with_capacity(command.aliases.len());
        for alias in std::mem::take(&mut command.aliases) {
            let taken = alias.eq_ignore_ascii_case(&command.name)
                || aliases.iter().any(|a: &String| a.eq_ignore_ascii_case(&alias));
            if taken {
                continue;
            }
            if let Some(owner) = self.claimed_by(&alias) {
                tracing::warn!(
                    addon = source,
                    owner,
                    command = command.name.as_str(),
                    alias = alias.as_str(),
                    "Alias already registered, dropping it"
                );
                continue;
            }
            aliases.push(alias);
        }
        command.aliases = aliases;

        tracing::debug!(addon = source, command = command.name.as_str(), "Command registered");
        self.commands.push((source.to_string(), command));
        true
    }

    /// Addon whose command already answers to `input`, by name or alias
    fn claimed_by(&self, input: &str) -> Option<&str> {
        self.commands
            .iter()
            .find(|(_, c)| c.matches(input))
            .map(|(owner, _)| owner.as_str())
    }

    pub fn find(&self, input: &str) -> Option<&CommandDefinition> {
        self.commands.iter().map(|(_, c)| c).find(|c| c.matches(input))
    }

    pub fn owner(&self, name: &str) -> Option<&str> {
        self.commands
            .iter()
            .find(|(_, c)| c.name == name)
            .map(|(owner, _)| owner.as_str())
    }

    pub fn definitions(&self) -> Vec<CommandDefinition> {
        self.commands.iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
