use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of user-triggered callback
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionKind {
    Button,
    SelectMenu,
    Modal,
    Autocomplete,
    Command,
    Other(String),
}

impl InteractionKind {
    pub fn as_str(&self) -> &str {
        match self {
            InteractionKind::Button => "button",
            InteractionKind::SelectMenu => "select-menu",
            InteractionKind::Modal => "modal",
            InteractionKind::Autocomplete => "autocomplete",
            InteractionKind::Command => "command",
            InteractionKind::Other(s) => s,
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "button" => InteractionKind::Button,
            "select-menu" => InteractionKind::SelectMenu,
            "modal" => InteractionKind::Modal,
            "autocomplete" => InteractionKind::Autocomplete,
            "command" => InteractionKind::Command,
            other => InteractionKind::Other(other.to_string()),
        })
    }
}

/// How a handler pattern is compared with an interaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    Exact,
    Prefix,
    Regex,
}

/// An incoming interaction as seen by handlers
#[derive(Debug, Clone)]
pub struct Interaction {
    pub kind: InteractionKind,
    pub custom_id: String,
    pub user_id: Option<String>,
    pub chat_id: Option<String>,
    pub data: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl Interaction {
    pub fn new(kind: InteractionKind, custom_id: impl Into<String>) -> Self {
        Self {
            kind,
            custom_id: custom_id.into(),
            user_id: None,
            chat_id: None,
            data: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_chat(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
