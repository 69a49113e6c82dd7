//! Interaction router - Routes UI callbacks to addon handlers

use regex_lite::Regex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use super::panic_message;
use crate::application::errors::{HandlerError, RouterError};
use crate::domain::entities::{Interaction, InteractionKind, MatchStrategy};

/// Handler callable. `Ok(true)` marks the interaction handled and stops dispatch.
pub type InteractionHandler = Arc<dyn Fn(&Interaction) -> Result<bool, HandlerError> + Send + Sync>;

/// Registration request for one handler
#[derive(Clone)]
pub struct HandlerRegistration {
    pub kind: InteractionKind,
    pub pattern: String,
    pub strategy: MatchStrategy,
    pub handler: InteractionHandler,
    pub priority: i32,
    pub source: String,
}

impl HandlerRegistration {
    pub fn new<F>(kind: InteractionKind, pattern: impl Into<String>, strategy: MatchStrategy, handler: F) -> Self
    where
        F: Fn(&Interaction) -> Result<bool, HandlerError> + Send + Sync + 'static,
    {
        Self {
            kind,
            pattern: pattern.into(),
            strategy,
            handler: Arc::new(handler),
            priority: 0,
            source: "unknown".to_string(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

enum Matcher {
    Exact(String),
    Prefix(String),
    Regex(Regex),
}

impl Matcher {
    fn compile(pattern: &str, strategy: MatchStrategy) -> Result<Self, RouterError> {
        Ok(match strategy {
            MatchStrategy::Exact => Matcher::Exact(pattern.to_string()),
            MatchStrategy::Prefix => Matcher::Prefix(pattern.to_string()),
            MatchStrategy::Regex => Matcher::Regex(Regex::new(pattern).map_err(|source| {
                RouterError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                }
            })?),
        })
    }

    fn matches(&self, identifier: &str) -> bool {
        match self {
            Matcher::Exact(p) => identifier == p,
            Matcher::Prefix(p) => identifier.starts_with(p.as_str()),
            Matcher::Regex(re) => re.is_match(identifier),
        }
    }
}

/// A registered handler with its compiled pattern
pub struct HandlerEntry {
    pattern: String,
    strategy: MatchStrategy,
    matcher: Matcher,
    handler: InteractionHandler,
    priority: i32,
    source: String,
}

impl HandlerEntry {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, identifier: &str) -> bool {
        self.matcher.matches(identifier)
    }
}

/// What happened to a dispatched interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler returned `true`
    Handled { source: String },
    /// Handlers matched but none claimed the interaction
    Unhandled { attempted: usize },
    /// No handler matched
    NoMatch,
}

/// Registration table keyed by interaction kind
#[derive(Default)]
pub struct InteractionRouter {
    table: RwLock<HashMap<InteractionKind, Vec<Arc<HandlerEntry>>>>,
}

impl InteractionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler, keeping each kind ordered by descending priority.
    /// Equal priorities keep registration order.
    pub fn register(&self, registration: HandlerRegistration) -> Result<(), RouterError> {
        let matcher = Matcher::compile(&registration.pattern, registration.strategy)?;
        let entry = Arc::new(HandlerEntry {
            pattern: registration.pattern,
            strategy: registration.strategy,
            matcher,
            handler: registration.handler,
            priority: registration.priority,
            source: registration.source,
        });

        debug!(
            kind = %registration.kind,
            pattern = entry.pattern.as_str(),
            strategy = ?entry.strategy,
            priority = entry.priority,
            addon = entry.source.as_str(),
            "Interaction handler registered"
        );

        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        let entries = table.entry(registration.kind).or_default();
        let at = entries.partition_point(|e| e.priority >= entry.priority);
        entries.insert(at, entry);
        Ok(())
    }

    /// First entry, in priority order, whose pattern matches `identifier`
    pub fn resolve(&self, kind: &InteractionKind, identifier: &str) -> Option<Arc<HandlerEntry>> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        table
            .get(kind)?
            .iter()
            .find(|e| e.matches(identifier))
            .cloned()
    }

    /// All matching entries, in dispatch order
    pub fn matching(&self, kind: &InteractionKind, identifier: &str) -> Vec<Arc<HandlerEntry>> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        table
            .get(kind)
            .map(|entries| entries.iter().filter(|e| e.matches(identifier)).cloned().collect())
            .unwrap_or_default()
    }

    /// Invoke matching handlers in order until one returns `true`.
    /// Failing or panicking handlers are logged and skipped.
    pub fn dispatch(&self, interaction: &Interaction) -> DispatchOutcome {
        // Snapshot so handlers can register while we run them
        let candidates = self.matching(&interaction.kind, &interaction.custom_id);
        if candidates.is_empty() {
            debug!(kind = %interaction.kind, id = interaction.custom_id.as_str(), "No interaction handler matched");
            return DispatchOutcome::NoMatch;
        }

        for entry in &candidates {
            let result = catch_unwind(AssertUnwindSafe(|| (entry.handler)(interaction)));
            match result {
                Ok(Ok(true)) => {
                    debug!(
                        kind = %interaction.kind,
                        id = interaction.custom_id.as_str(),
                        addon = entry.source.as_str(),
                        "Interaction handled"
                    );
                    return DispatchOutcome::Handled {
                        source: entry.source.clone(),
                    };
                }
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    warn!(
                        kind = %interaction.kind,
                        id = interaction.custom_id.as_str(),
                        addon = entry.source.as_str(),
                        error = %e,
                        "Interaction handler failed"
                    );
                }
                Err(panic) => {
                    warn!(
                        kind = %interaction.kind,
                        id = interaction.custom_id.as_str(),
                        addon = entry.source.as_str(),
                        error = %panic_message(panic.as_ref()),
                        "Interaction handler panicked"
                    );
                }
            }
        }

        DispatchOutcome::Unhandled {
            attempted: candidates.len(),
        }
    }

    /// Number of handlers registered for a kind
    pub fn handler_count(&self, kind: &InteractionKind) -> usize {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        table.get(kind).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        table.values().all(Vec::is_empty)
    }
}
