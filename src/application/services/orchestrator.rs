//! Load orchestrator - drives the startup phase sequence

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::application::context::{AddonContext, RuntimeServices};
use crate::application::errors::{AddonError, RuntimeError};
use crate::application::services::capability_service::CapabilitySet;
use crate::application::services::runtime::{deadline_after, settle, AddonRuntime, LoadedAddon, Settled};
use crate::domain::entities::{priority_groups, AddonDescriptor, AddonNode, AddonTree, CommandDefinition, CommandRegistry};
use crate::domain::traits::{Addon, AddonHooks, AddonSource, CapabilityReader, HostConnection};
use crate::infrastructure::addons::AddonScanner;
use crate::infrastructure::database::Database;

pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Startup phases, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Scan,
    AggregateCapabilities,
    Connect,
    LoadCommands,
    LoadAddons,
    Ready,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Scan => "scan",
            Phase::AggregateCapabilities => "aggregate-capabilities",
            Phase::Connect => "connect",
            Phase::LoadCommands => "load-commands",
            Phase::LoadAddons => "load-addons",
            Phase::Ready => "ready",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum LoadStatus {
    Loaded,
    Failed { reason: String },
    TimedOut,
}

/// Outcome of one addon's load
#[derive(Debug, Clone, Serialize)]
pub struct AddonOutcome {
    pub name: String,
    pub path: PathBuf,
    pub priority: i64,
    pub status: LoadStatus,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub capabilities: CapabilitySet,
    pub commands: usize,
    /// In load order
    pub addons: Vec<AddonOutcome>,
}

impl LoadReport {
    pub fn outcome(&self, name: &str) -> Option<&AddonOutcome> {
        self.addons.iter().find(|o| o.name == name)
    }

    pub fn status_of(&self, name: &str) -> Option<&LoadStatus> {
        self.outcome(name).map(|o| &o.status)
    }

    pub fn loaded(&self) -> impl Iterator<Item = &AddonOutcome> {
        self.addons.iter().filter(|o| o.status == LoadStatus::Loaded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &AddonOutcome> {
        self.addons.iter().filter(|o| o.status != LoadStatus::Loaded)
    }
}

/// Result of a full startup run
pub struct LoadResult {
    pub report: LoadReport,
    pub runtime: AddonRuntime,
}

/// Units resolved during the command phase, keyed by addon directory
type ResolvedUnits = HashMap<PathBuf, Vec<Arc<dyn Addon>>>;

/// Mutable state threaded through the addon-load recursion
#[derive(Default)]
struct LoadState {
    outcomes: Vec<AddonOutcome>,
    loaded: Vec<LoadedAddon>,
}

impl LoadState {
    fn record(&mut self, descriptor: &AddonDescriptor, status: LoadStatus, elapsed: Duration) {
        self.outcomes.push(AddonOutcome {
            name: descriptor.name(),
            path: descriptor.absolute_path.clone(),
            priority: descriptor.priority,
            status,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        });
    }
}

pub struct LoadOrchestrator {
    scanner: AddonScanner,
    source: Arc<dyn AddonSource>,
    capability_reader: Arc<dyn CapabilityReader>,
    host: Arc<dyn HostConnection>,
    services: RuntimeServices,
    schema_db: Option<Arc<Database>>,
    load_timeout: Duration,
}

impl LoadOrchestrator {
    pub fn new(
        scanner: AddonScanner,
        source: Arc<dyn AddonSource>,
        capability_reader: Arc<dyn CapabilityReader>,
        host: Arc<dyn HostConnection>,
        services: RuntimeServices,
    ) -> Self {
        Self {
            scanner,
            source,
            capability_reader,
            host,
            services,
            schema_db: None,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
        }
    }

    /// Per-addon bound on loads and hook invocations
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    /// Run each addon's `*.sql` files against this database before it loads
    pub fn with_schema_db(mut self, db: Arc<Database>) -> Self {
        self.schema_db = Some(db);
        self
    }

    pub fn services(&self) -> &RuntimeServices {
        &self.services
    }

    /// Run every startup phase against the addons under `root`
    pub async fn run(&self, root: &Path) -> Result<LoadResult, RuntimeError> {
        let started_at = Utc::now();

        let phase = self.begin(Phase::Scan);
        let tree = self.scanner.scan(root);
        info!(addons = tree.len(), root = %root.display(), "Addons discovered");
        self.end(Phase::Scan, phase);

        let phase = self.begin(Phase::AggregateCapabilities);
        let capabilities = &self.services.capabilities;
        capabilities.collect(&tree, self.capability_reader.as_ref());
        let capability_set = capabilities.finalize();
        self.end(Phase::AggregateCapabilities, phase);

        let phase = self.begin(Phase::Connect);
        let session = self.host.connect(&capability_set.capabilities).await?;
        capabilities.record_granted(session.granted);
        let host = self.host.host_info();
        info!(host = host.name.as_str(), capabilities = capability_set.len(), "Host connection opened");
        self.end(Phase::Connect, phase);

        let mut state = LoadState::default();

        let phase = self.begin(Phase::LoadCommands);
        let (units, commands) = self.resolve_units(&tree, &mut state).await;
        self.end(Phase::LoadCommands, phase);

        let phase = self.begin(Phase::LoadAddons);
        self.load_level(&tree.roots, &units, &mut state).await;
        self.end(Phase::LoadAddons, phase);

        let runtime = AddonRuntime::new(self.services.clone(), state.loaded, self.load_timeout);

        let phase = self.begin(Phase::Ready);
        let ready = runtime.invoke_ready().await;
        debug!(ready, "Ready hooks invoked");
        self.end(Phase::Ready, phase);

        let report = LoadReport {
            started_at,
            finished_at: Utc::now(),
            capabilities: capability_set,
            commands,
            addons: state.outcomes,
        };
        info!(
            loaded = report.loaded().count(),
            failed = report.failed().count(),
            "Addon runtime ready"
        );

        Ok(LoadResult { report, runtime })
    }

    fn begin(&self, phase: Phase) -> Instant {
        info!(%phase, "Phase started");
        Instant::now()
    }

    fn end(&self, phase: Phase, started: Instant) {
        debug!(%phase, elapsed_ms = started.elapsed().as_millis() as u64, "Phase finished");
    }

    /// Import every addon's entry files and register their commands with the host.
    /// Each import runs on the blocking pool under the load timeout, so a panicking
    /// or stuck import only fails its own addon.
    async fn resolve_units(&self, tree: &AddonTree, state: &mut LoadState) -> (ResolvedUnits, usize) {
        let mut units = ResolvedUnits::new();
        let mut registry = CommandRegistry::new();

        for descriptor in tree.descriptors() {
            let name = descriptor.name();
            let started = Instant::now();
            let handle = tokio::task::spawn_blocking({
                let source = Arc::clone(&self.source);
                let descriptor = descriptor.clone();
                move || import_addon(source.as_ref(), &descriptor)
            });

            match settle(handle, deadline_after(started, self.load_timeout)).await {
                Settled::Done((resolved, commands)) => {
                    for command in commands {
                        registry.register(&name, command);
                    }
                    units.insert(descriptor.absolute_path.clone(), resolved);
                }
                Settled::Failed(reason) => {
                    error!(addon = name.as_str(), error = reason.as_str(), "Failed to import addon");
                    state.record(descriptor, LoadStatus::Failed { reason }, started.elapsed());
                }
                Settled::TimedOut => {
                    warn!(addon = name.as_str(), timeout = ?self.load_timeout, "Addon import timed out");
                    state.record(descriptor, LoadStatus::TimedOut, self.load_timeout);
                }
            }
        }

        let definitions = registry.definitions();
        match self.host.register_commands(&definitions).await {
            Ok(()) => info!(count = definitions.len(), "Commands registered with host"),
            Err(e) => warn!(error = %e, "Failed to register commands with host"),
        }
        (units, registry.len())
    }

    /// Load one sibling level: each priority group concurrently, then the
    /// group members' children before the next group starts.
    fn load_level<'a>(
        &'a self,
        nodes: &'a [AddonNode],
        units: &'a ResolvedUnits,
        state: &'a mut LoadState,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            for group in priority_groups(nodes) {
                debug!(priority = group.priority, members = group.members.len(), "Loading priority group");
                self.load_group(&group.members, units, state).await;

                for member in &group.members {
                    if !member.children.is_empty() {
                        self.load_level(&member.children, units, state).await;
                    }
                }
            }
        })
    }

    async fn load_group(&self, members: &[&AddonNode], units: &ResolvedUnits, state: &mut LoadState) {
        let started = Instant::now();
        let deadline = deadline_after(started, self.load_timeout);

        let mut pending = Vec::with_capacity(members.len());
        for member in members {
            // Failed imports were already reported during the command phase
            let Some(resolved) = units.get(&member.descriptor.absolute_path) else {
                continue;
            };
            let descriptor = Arc::new(member.descriptor.clone());
            let ctx = AddonContext::new(Arc::clone(&descriptor), self.services.clone());
            let handle = tokio::spawn(load_addon(ctx, resolved.clone(), self.schema_db.clone()));
            pending.push((descriptor, handle));
        }

        for (descriptor, handle) in pending {
            let name = descriptor.name();
            let settled = settle(handle, deadline).await;
            let elapsed = started.elapsed();
            match settled {
                Settled::Done(hooks) => {
                    info!(addon = name.as_str(), hooks = ?hooks, "Addon loaded");
                    debug!(addon = name.as_str(), elapsed_ms = elapsed.as_millis() as u64, "Addon load time");
                    state.record(&descriptor, LoadStatus::Loaded, elapsed);
                    state.loaded.push(LoadedAddon { name, descriptor, hooks });
                }
                Settled::Failed(reason) => {
                    error!(addon = name.as_str(), error = reason.as_str(), "Addon failed to load");
                    state.record(&descriptor, LoadStatus::Failed { reason }, elapsed);
                }
                Settled::TimedOut => {
                    warn!(addon = name.as_str(), timeout = ?self.load_timeout, "Addon load timed out");
                    state.record(&descriptor, LoadStatus::TimedOut, self.load_timeout);
                }
            }
        }
    }
}

/// Resolve every entry file of one addon and collect the commands its units declare
fn import_addon(
    source: &dyn AddonSource,
    descriptor: &AddonDescriptor,
) -> Result<(Vec<Arc<dyn Addon>>, Vec<CommandDefinition>), AddonError> {
    let mut resolved = Vec::new();
    for entry in descriptor.entry_files() {
        resolved.push(source.resolve(descriptor, entry)?);
    }
    let commands = resolved.iter().flat_map(|unit| unit.commands()).collect();
    Ok((resolved, commands))
}

/// Body of one spawned addon load: schema files, then each unit's `load`
async fn load_addon(
    ctx: AddonContext,
    units: Vec<Arc<dyn Addon>>,
    schema_db: Option<Arc<Database>>,
) -> Result<AddonHooks, AddonError> {
    if let Some(db) = schema_db {
        let dir = ctx.descriptor().absolute_path.clone();
        let applied = tokio::task::spawn_blocking(move || db.apply_schema_dir(&dir))
            .await
            .map_err(|e| AddonError::Load(format!("schema task failed: {}", e)))??;
        if applied > 0 {
            debug!(addon = ctx.addon_name(), files = applied, "Schema files applied");
        }
    }

    let mut hooks = AddonHooks::new();
    for unit in units {
        debug!(addon = ctx.addon_name(), unit = unit.name(), "Loading unit");
        hooks.merge(unit.load(ctx.clone()).await?);
    }
    Ok(hooks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_filters_by_status() {
        let outcome = |name: &str, status| AddonOutcome {
            name: name.to_string(),
            path: PathBuf::from(format!("/addons/{}", name)),
            priority: 0,
            status,
            elapsed_ms: 0,
        };
        let report = LoadReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            capabilities: CapabilitySet::default(),
            commands: 0,
            addons: vec![
                outcome("a", LoadStatus::Loaded),
                outcome("b", LoadStatus::TimedOut),
                outcome("c", LoadStatus::Failed { reason: "boom".into() }),
            ],
        };
        assert_eq!(report.loaded().count(), 1);
        assert_eq!(report.failed().count(), 2);
        assert_eq!(report.status_of("b"), Some(&LoadStatus::TimedOut));

        let json = serde_json::to_value(&report.addons[2]).unwrap();
        assert_eq!(json["status"]["status"], "failed");
        assert_eq!(json["status"]["reason"], "boom");
    }

    #[test]
    fn phases_display_in_kebab_case() {
        assert_eq!(Phase::AggregateCapabilities.to_string(), "aggregate-capabilities");
        assert_eq!(Phase::LoadAddons.to_string(), "load-addons");
    }
}
