//! Console host for development/testing
//!
//! Reads one event per line:
//! - `/button ticket-1 {"extra":1}` delivers an interaction (kind, id, optional JSON data)
//! - `memberJoin {"user":"42"}` delivers a platform event with an optional JSON payload

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::Mutex;

use crate::application::errors::HostError;
use crate::domain::entities::{CommandDefinition, Interaction, InteractionKind, PlatformEvent};
use crate::domain::traits::{HostConnection, HostEvent, HostInfo, HostSession};

type LineReader = Lines<Box<dyn AsyncBufRead + Unpin + Send>>;

pub struct ConsoleHost {
    info: HostInfo,
    user_id: String,
    always_granted: BTreeSet<String>,
    lines: Mutex<LineReader>,
}

impl ConsoleHost {
    /// Console host reading from stdin
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = Box::new(reader);
        Self {
            info: HostInfo {
                id: "console".to_string(),
                name: "addon-host".to_string(),
            },
            user_id: "console".to_string(),
            always_granted: BTreeSet::new(),
            lines: Mutex::new(reader.lines()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.info.name = name.into();
        self
    }

    /// Capabilities granted on top of whatever is requested
    pub fn with_granted<I>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.always_granted.extend(capabilities);
        self
    }

    /// Parse one input line; `Ok(None)` for blank lines and comments
    pub fn parse_line(&self, line: &str) -> Result<Option<HostEvent>, String> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        if let Some(rest) = line.strip_prefix('/') {
            let mut parts = rest.splitn(3, char::is_whitespace);
            let kind = parts.next().unwrap_or_default();
            let custom_id = parts
                .next()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| format!("Missing interaction id in '{}'", line))?;
            let kind: InteractionKind = match kind.parse() {
                Ok(kind) => kind,
                Err(never) => match never {},
            };
            let interaction = Interaction::new(kind, custom_id)
                .with_user(self.user_id.clone())
                .with_chat("console")
                .with_data(parse_payload(parts.next())?);
            return Ok(Some(HostEvent::Interaction(interaction)));
        }

        let (name, payload) = match line.split_once(char::is_whitespace) {
            Some((name, payload)) => (name, Some(payload)),
            None => (line, None),
        };
        let event: PlatformEvent = name.parse()?;
        Ok(Some(HostEvent::Platform {
            event,
            payload: parse_payload(payload)?,
        }))
    }
}

fn parse_payload(raw: Option<&str>) -> Result<Value, String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => serde_json::from_str(raw).map_err(|e| format!("Invalid JSON payload: {}", e)),
        None => Ok(Value::Null),
    }
}

fn command_line(command: &CommandDefinition) -> String {
    match command.description {
        Some(ref description) => format!("[HOST] command /{} - {}", command.name, description),
        None => format!("[HOST] command /{}", command.name),
    }
}

#[async_trait]
impl HostConnection for ConsoleHost {
    async fn connect(&self, capabilities: &BTreeSet<String>) -> Result<HostSession, HostError> {
        let granted: BTreeSet<String> = capabilities.union(&self.always_granted).cloned().collect();
        tracing::info!(
            capabilities = ?granted,
            "Starting console host (dev mode)"
        );
        Ok(HostSession { granted })
    }

    async fn register_commands(&self, commands: &[CommandDefinition]) -> Result<(), HostError> {
        for command in commands {
            println!("{}", command_line(command));
        }
        Ok(())
    }

    async fn next_event(&self) -> Option<HostEvent> {
        let mut lines = self.lines.lock().await;
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read console input");
                    return None;
                }
            };
            match self.parse_line(&line) {
                Ok(Some(event)) => return Some(event),
                Ok(None) => continue,
                Err(e) => tracing::warn!(error = e.as_str(), "Ignoring console input"),
            }
        }
    }

    fn host_info(&self) -> HostInfo {
        self.info.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(input: &'static str) -> ConsoleHost {
        ConsoleHost::from_reader(BufReader::new(input.as_bytes()))
    }

    #[test]
    fn parses_interactions_and_platform_events() {
        let console = host("");
        match console.parse_line("/button ticket-close-7 {\"reason\":\"done\"}").unwrap() {
            Some(HostEvent::Interaction(i)) => {
                assert_eq!(i.kind, InteractionKind::Button);
                assert_eq!(i.custom_id, "ticket-close-7");
                assert_eq!(i.data["reason"], "done");
            }
            other => panic!("unexpected {:?}", other),
        }
        match console.parse_line("memberJoin {\"user\":\"42\"}").unwrap() {
            Some(HostEvent::Platform { event, payload }) => {
                assert_eq!(event, PlatformEvent::MemberJoin);
                assert_eq!(payload["user"], "42");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(console.parse_line("# comment").unwrap().is_none());
        assert!(console.parse_line("memberjoin").is_err());
        assert!(console.parse_line("/button").is_err());
        assert!(console.parse_line("reactionAdd {oops").is_err());
    }

    #[tokio::test]
    async fn next_event_skips_bad_lines_until_eof() {
        let console = host("\nbogus\n/modal feedback\nchannelCreate\n");
        assert!(matches!(console.next_event().await, Some(HostEvent::Interaction(_))));
        assert!(matches!(
            console.next_event().await,
            Some(HostEvent::Platform { event: PlatformEvent::ChannelCreate, .. })
        ));
        assert!(console.next_event().await.is_none());
    }

    #[tokio::test]
    async fn registers_commands_with_and_without_description() {
        let plain = CommandDefinition::new("faq");
        let described = CommandDefinition::new("ticket").with_description("Open a ticket");
        assert_eq!(command_line(&plain), "[HOST] command /faq");
        assert_eq!(command_line(&described), "[HOST] command /ticket - Open a ticket");
        assert!(host("").register_commands(&[plain, described]).await.is_ok());
    }

    #[tokio::test]
    async fn connect_grants_requested_and_default_capabilities() {
        let console = host("").with_granted(vec!["DirectMessages".to_string()]);
        let requested: BTreeSet<String> = ["Guilds".to_string()].into_iter().collect();
        let session = console.connect(&requested).await.unwrap();
        assert_eq!(session.granted.len(), 2);
    }
}
