use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::application::errors::BusError;

/// Bus key of the form `<namespace>:<eventName>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    namespace: String,
    event: String,
}

impl EventKey {
    pub fn new(namespace: impl Into<String>, event: impl Into<String>) -> Result<Self, BusError> {
        let namespace = namespace.into();
        let event = event.into();
        if namespace.is_empty() || event.is_empty() || namespace.contains(':') {
            return Err(BusError::InvalidKey(format!("{}:{}", namespace, event)));
        }
        Ok(Self { namespace, event })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

impl FromStr for EventKey {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, event) = s
            .split_once(':')
            .ok_or_else(|| BusError::InvalidKey(s.to_string()))?;
        Self::new(namespace, event)
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.event)
    }
}

/// Platform events an addon may hook; names must match exactly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlatformEvent {
    MessageCreate,
    MessageDelete,
    MemberJoin,
    MemberLeave,
    ReactionAdd,
    ReactionRemove,
    ChannelCreate,
    ChannelDelete,
}

impl PlatformEvent {
    pub const ALL: [PlatformEvent; 8] = [
        PlatformEvent::MessageCreate,
        PlatformEvent::MessageDelete,
        PlatformEvent::MemberJoin,
        PlatformEvent::MemberLeave,
        PlatformEvent::ReactionAdd,
        PlatformEvent::ReactionRemove,
        PlatformEvent::ChannelCreate,
        PlatformEvent::ChannelDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformEvent::MessageCreate => "messageCreate",
            PlatformEvent::MessageDelete => "messageDelete",
            PlatformEvent::MemberJoin => "memberJoin",
            PlatformEvent::MemberLeave => "memberLeave",
            PlatformEvent::ReactionAdd => "reactionAdd",
            PlatformEvent::ReactionRemove => "reactionRemove",
            PlatformEvent::ChannelCreate => "channelCreate",
            PlatformEvent::ChannelDelete => "channelDelete",
        }
    }
}

impl fmt::Display for PlatformEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlatformEvent::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("unknown platform event '{}'", s))
    }
}
