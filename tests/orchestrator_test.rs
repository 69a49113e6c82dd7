//! End-to-end load tests: scan a temp addons directory, load through a mock host
//! Run with: cargo test --test orchestrator_test

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tempfile::TempDir;

use addon_host::application::context::{AddonContext, RuntimeServices};
use addon_host::application::errors::{AddonError, HostError, ProtectionError};
use addon_host::application::messaging::{listener, DispatchOutcome, GuardOptions, RateLimit};
use addon_host::application::services::{LoadOrchestrator, LoadResult, LoadStatus};
use addon_host::domain::entities::{CommandDefinition, Interaction, InteractionKind, MatchStrategy, PlatformEvent};
use addon_host::domain::traits::{Addon, AddonHooks, HostConnection, HostEvent, HostInfo, HostSession};
use addon_host::infrastructure::addons::{AddonCatalog, AddonScanner, YamlCapabilityReader, DEFAULT_MANIFEST_NAME};
use addon_host::infrastructure::database::Database;

static INIT: Once = Once::new();

fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

type Log = Arc<Mutex<Vec<String>>>;
type Setup = Arc<dyn Fn(&AddonContext, &Log) -> Result<AddonHooks, AddonError> + Send + Sync>;

#[derive(Default)]
struct MockHost {
    requested: Mutex<BTreeSet<String>>,
    commands: Mutex<Vec<String>>,
    events: tokio::sync::Mutex<VecDeque<HostEvent>>,
}

impl MockHost {
    fn with_events(events: Vec<HostEvent>) -> Self {
        Self {
            events: tokio::sync::Mutex::new(events.into()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl HostConnection for MockHost {
    async fn connect(&self, capabilities: &BTreeSet<String>) -> Result<HostSession, HostError> {
        *self.requested.lock().unwrap() = capabilities.clone();
        Ok(HostSession {
            granted: capabilities.clone(),
        })
    }

    async fn register_commands(&self, commands: &[CommandDefinition]) -> Result<(), HostError> {
        self.commands.lock().unwrap().extend(commands.iter().map(|c| c.name.clone()));
        Ok(())
    }

    async fn next_event(&self) -> Option<HostEvent> {
        self.events.lock().await.pop_front()
    }

    fn host_info(&self) -> HostInfo {
        HostInfo {
            id: "mock".to_string(),
            name: "mock-host".to_string(),
        }
    }
}

enum Behavior {
    Succeed,
    Fail,
    Panic,
    Hang,
    /// Wait until every addon sharing the barrier has started loading
    Rendezvous(Arc<tokio::sync::Barrier>),
    Custom(Setup),
}

fn custom<F>(setup: F) -> Behavior
where
    F: Fn(&AddonContext, &Log) -> Result<AddonHooks, AddonError> + Send + Sync + 'static,
{
    Behavior::Custom(Arc::new(setup))
}

struct TestAddon {
    name: String,
    log: Log,
    behavior: Behavior,
    commands: Vec<CommandDefinition>,
}

#[async_trait]
impl Addon for TestAddon {
    fn name(&self) -> &str {
        &self.name
    }

    fn commands(&self) -> Vec<CommandDefinition> {
        self.commands.clone()
    }

    async fn load(&self, ctx: AddonContext) -> Result<AddonHooks, AddonError> {
        match self.behavior {
            Behavior::Succeed => {}
            Behavior::Fail => return Err(AddonError::Load("missing token".into())),
            Behavior::Panic => panic!("addon blew up"),
            Behavior::Hang => tokio::time::sleep(Duration::from_secs(3600)).await,
            Behavior::Rendezvous(ref barrier) => {
                barrier.wait().await;
            }
            Behavior::Custom(ref setup) => {
                let hooks = setup(&ctx, &self.log)?;
                self.log.lock().unwrap().push(self.name.clone());
                return Ok(hooks);
            }
        }
        self.log.lock().unwrap().push(self.name.clone());
        Ok(AddonHooks::new())
    }
}

struct Fixture {
    dir: TempDir,
    catalog: AddonCatalog,
    log: Log,
}

impl Fixture {
    fn new() -> Self {
        ensure_init();
        Self {
            dir: TempDir::new().unwrap(),
            catalog: AddonCatalog::new(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Write an addon at `rel` whose `main` entry resolves to `behavior`
    fn addon(&self, rel: &str, extra_manifest: &str, behavior: Behavior) -> &Self {
        self.addon_with_commands(rel, extra_manifest, behavior, Vec::new())
    }

    fn addon_with_commands(&self, rel: &str, extra_manifest: &str, behavior: Behavior, commands: Vec<CommandDefinition>) -> &Self {
        let dir = self.dir.path().join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DEFAULT_MANIFEST_NAME), format!("addonfile: main\n{}", extra_manifest)).unwrap();

        let name = Path::new(rel).file_name().unwrap().to_string_lossy().into_owned();
        self.catalog.register_addon(
            format!("{}/main", name),
            Arc::new(TestAddon {
                name,
                log: Arc::clone(&self.log),
                behavior,
                commands,
            }),
        );
        self
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn orchestrator(self, host: Arc<MockHost>) -> (LoadOrchestrator, TempDir, Log) {
        let orchestrator = LoadOrchestrator::new(
            AddonScanner::new(),
            Arc::new(self.catalog),
            Arc::new(YamlCapabilityReader),
            host,
            RuntimeServices::default(),
        );
        (orchestrator, self.dir, self.log)
    }
}

async fn run(fixture: Fixture, host: Arc<MockHost>) -> (LoadResult, Vec<String>) {
    let (orchestrator, dir, log) = fixture.orchestrator(host);
    let result = orchestrator.run(dir.path()).await.unwrap();
    let order = log.lock().unwrap().clone();
    (result, order)
}

#[tokio::test]
async fn groups_load_by_priority_and_children_follow_parent() {
    let fixture = Fixture::new();
    fixture
        .addon("core", "priority: 10\nextensions: ext", Behavior::Succeed)
        .addon("core/ext/core-child", "", Behavior::Succeed)
        .addon("beta", "priority: 1", Behavior::Succeed)
        .addon("alpha", "priority: 1", Behavior::Succeed)
        .addon("last", "priority: -5", Behavior::Succeed);

    let (result, order) = run(fixture, Arc::new(MockHost::default())).await;

    assert_eq!(order[0], "core");
    assert_eq!(order[1], "core-child");
    let middle: BTreeSet<&str> = order[2..4].iter().map(String::as_str).collect();
    assert_eq!(middle, BTreeSet::from(["alpha", "beta"]));
    assert_eq!(order[4], "last");

    let reported: Vec<&str> = result.report.addons.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(reported, vec!["core", "core-child", "alpha", "beta", "last"]);
    assert_eq!(result.report.loaded().count(), 5);
    assert_eq!(result.runtime.addon_names().len(), 5);
}

#[tokio::test]
async fn invalid_manifest_is_skipped_without_aborting() {
    let fixture = Fixture::new();
    fixture.addon("good", "", Behavior::Succeed);
    fixture.write("broken/addon.info", "name: broken\npriority: 99\n");

    let (result, order) = run(fixture, Arc::new(MockHost::default())).await;

    assert_eq!(order, vec!["good"]);
    assert!(result.report.outcome("broken").is_none());
    assert_eq!(result.report.addons.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_addon_times_out_without_blocking_siblings() {
    let fixture = Fixture::new();
    fixture
        .addon("stuck", "priority: 5", Behavior::Hang)
        .addon("steady", "priority: 5", Behavior::Succeed)
        .addon("after", "priority: 1", Behavior::Succeed);

    let (orchestrator, dir, log) = fixture.orchestrator(Arc::new(MockHost::default()));
    let orchestrator = orchestrator.with_load_timeout(Duration::from_secs(30));

    let started = tokio::time::Instant::now();
    let result = orchestrator.run(dir.path()).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(started.elapsed() < Duration::from_secs(3600));
    assert_eq!(result.report.status_of("stuck"), Some(&LoadStatus::TimedOut));
    assert_eq!(result.report.status_of("steady"), Some(&LoadStatus::Loaded));
    assert_eq!(result.report.status_of("after"), Some(&LoadStatus::Loaded));
    assert_eq!(*log.lock().unwrap(), vec!["steady", "after"]);
}

#[tokio::test(start_paused = true)]
async fn same_priority_addons_load_concurrently() {
    let barrier = Arc::new(tokio::sync::Barrier::new(2));
    let fixture = Fixture::new();
    fixture
        .addon("left", "priority: 3", Behavior::Rendezvous(Arc::clone(&barrier)))
        .addon("right", "priority: 3", Behavior::Rendezvous(Arc::clone(&barrier)));

    let (orchestrator, dir, log) = fixture.orchestrator(Arc::new(MockHost::default()));
    let orchestrator = orchestrator.with_load_timeout(Duration::from_secs(5));

    let started = tokio::time::Instant::now();
    let result = orchestrator.run(dir.path()).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.report.status_of("left"), Some(&LoadStatus::Loaded));
    assert_eq!(result.report.status_of("right"), Some(&LoadStatus::Loaded));
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn panicking_import_fails_only_its_addon() {
    let fixture = Fixture::new();
    fixture.addon("good", "", Behavior::Succeed);
    fixture.write("bad/addon.info", "addonfile: main\n");
    fixture.catalog.register("bad/main", |_| panic!("import blew up"));

    let (result, order) = run(fixture, Arc::new(MockHost::default())).await;

    assert_eq!(order, vec!["good"]);
    assert_eq!(result.report.status_of("good"), Some(&LoadStatus::Loaded));
    assert!(matches!(result.report.status_of("bad"), Some(LoadStatus::Failed { reason }) if reason.contains("import blew up")));
    assert_eq!(result.runtime.addon_names(), vec!["good"]);
}

#[tokio::test]
async fn failures_and_panics_are_isolated() {
    let fixture = Fixture::new();
    fixture
        .addon("fails", "", Behavior::Fail)
        .addon("panics", "", Behavior::Panic)
        .addon("works", "", Behavior::Succeed);
    fixture.write("unresolved/addon.info", "addonfile: nowhere\n");

    let (result, order) = run(fixture, Arc::new(MockHost::default())).await;

    assert_eq!(order, vec!["works"]);
    assert!(matches!(result.report.status_of("fails"), Some(LoadStatus::Failed { reason }) if reason.contains("missing token")));
    assert!(matches!(result.report.status_of("panics"), Some(LoadStatus::Failed { reason }) if reason.contains("addon blew up")));
    assert!(matches!(result.report.status_of("unresolved"), Some(LoadStatus::Failed { .. })));
    assert_eq!(result.runtime.addon_names(), vec!["works"]);
}

#[tokio::test]
async fn capabilities_are_merged_before_connect_and_frozen_after() {
    let late_answer = Arc::new(Mutex::new(None));
    let answer = Arc::clone(&late_answer);

    let fixture = Fixture::new();
    fixture
        .addon("one", "intentconfig: intents.yaml", Behavior::Succeed)
        .addon(
            "two",
            "intentconfig: intents.yaml",
            custom(move |ctx, _| {
                *answer.lock().unwrap() = Some((ctx.request_capability("Guilds"), ctx.request_capability("GuildPresences")));
                Ok(AddonHooks::new())
            }),
        );
    fixture.write("one/intents.yaml", "- Guilds\n- GuildMessages\n");
    fixture.write("two/intents.yaml", "intents:\n  - Guilds\n  - GuildMembers\n");

    let host = Arc::new(MockHost::default());
    let (result, _) = run(fixture, Arc::clone(&host)).await;

    let requested = host.requested.lock().unwrap().clone();
    assert_eq!(requested, BTreeSet::from(["GuildMembers".to_string(), "GuildMessages".to_string(), "Guilds".to_string()]));
    assert_eq!(result.report.capabilities.len(), 3);
    assert_eq!(*late_answer.lock().unwrap(), Some((true, false)));
}

#[tokio::test]
async fn commands_are_collected_and_deduplicated() {
    let fixture = Fixture::new();
    fixture
        .addon_with_commands(
            "tickets",
            "priority: 2",
            Behavior::Succeed,
            vec![CommandDefinition::new("ticket").with_description("Open a ticket")],
        )
        .addon_with_commands(
            "support",
            "",
            Behavior::Succeed,
            vec![CommandDefinition::new("ticket"), CommandDefinition::new("faq")],
        );

    let host = Arc::new(MockHost::default());
    let (result, _) = run(fixture, Arc::clone(&host)).await;

    let mut registered = host.commands.lock().unwrap().clone();
    registered.sort();
    assert_eq!(registered, vec!["faq", "ticket"]);
    assert_eq!(result.report.commands, 2);
}

#[tokio::test]
async fn schema_files_run_before_addon_load() {
    let db = Arc::new(Database::in_memory().unwrap());
    let seen_table = Arc::new(Mutex::new(false));

    let fixture = Fixture::new();
    let check_db = Arc::clone(&db);
    let seen = Arc::clone(&seen_table);
    fixture.addon(
        "tickets",
        "",
        custom(move |_, _| {
            *seen.lock().unwrap() = check_db.table_exists("tickets").unwrap();
            Ok(AddonHooks::new())
        }),
    );
    fixture.write("tickets/schema.sql", "CREATE TABLE tickets (id INTEGER PRIMARY KEY);");
    fixture.write("broken/addon.info", "addonfile: main\n");
    fixture.write("broken/schema.sql", "CREATE TABLE (;");
    fixture.catalog.register_addon(
        "broken/main",
        Arc::new(TestAddon {
            name: "broken".into(),
            log: Arc::clone(&fixture.log),
            behavior: Behavior::Succeed,
            commands: Vec::new(),
        }),
    );

    let (orchestrator, dir, _) = fixture.orchestrator(Arc::new(MockHost::default()));
    let result = orchestrator.with_schema_db(db).run(dir.path()).await.unwrap();

    assert!(*seen_table.lock().unwrap());
    assert!(matches!(result.report.status_of("broken"), Some(LoadStatus::Failed { .. })));
}

#[tokio::test]
async fn addons_share_router_bus_and_protection() {
    let fixture = Fixture::new();
    fixture
        .addon(
            "tickets",
            "priority: 5",
            custom(|ctx, _| {
                let bus = Arc::clone(&ctx.services().bus);
                ctx.register_interaction(InteractionKind::Button, "ticket-", MatchStrategy::Prefix, 0, move |i| {
                    bus.emit("tickets:opened", &json!({ "id": i.custom_id }));
                    Ok(true)
                })
                .map_err(|e| AddonError::Load(e.to_string()))?;
                ctx.protection().set_limit("createTicket", RateLimit::per_seconds(3, 10));
                Ok(AddonHooks::new())
            }),
        )
        .addon(
            "audit",
            "priority: 1",
            custom(|ctx, log| {
                let sink = Arc::clone(log);
                ctx.bus()
                    .on(
                        "tickets:opened",
                        listener(move |payload: &Value| {
                            sink.lock().unwrap().push(format!("opened {}", payload["id"].as_str().unwrap_or("?")));
                            Ok(())
                        }),
                    )
                    .map_err(|e| AddonError::Load(e.to_string()))?;
                ctx.register_interaction(InteractionKind::Button, "ticket-admin", MatchStrategy::Exact, 10, |_| Ok(false))
                    .map_err(|e| AddonError::Load(e.to_string()))?;

                let joined = Arc::clone(log);
                Ok(AddonHooks::new().on(PlatformEvent::MemberJoin, move |payload| {
                    let joined = Arc::clone(&joined);
                    async move {
                        joined.lock().unwrap().push(format!("joined {}", payload["user"]));
                        Ok(())
                    }
                }))
            }),
        );

    let host = Arc::new(MockHost::with_events(vec![
        HostEvent::Interaction(Interaction::new(InteractionKind::Button, "ticket-admin")),
        HostEvent::Platform {
            event: PlatformEvent::MemberJoin,
            payload: json!({ "user": 7 }),
        },
    ]));
    let (orchestrator, dir, log) = fixture.orchestrator(Arc::clone(&host));
    let result = orchestrator.run(dir.path()).await.unwrap();
    let runtime = &result.runtime;

    assert_eq!(runtime.serve(host.as_ref()).await, 2);

    let outcome = runtime.dispatch_interaction(&Interaction::new(InteractionKind::Button, "ticket-9"));
    assert_eq!(outcome, DispatchOutcome::Handled { source: "tickets".to_string() });
    let outcome = runtime.dispatch_interaction(&Interaction::new(InteractionKind::SelectMenu, "ticket-9"));
    assert_eq!(outcome, DispatchOutcome::NoMatch);

    let log = log.lock().unwrap().clone();
    assert!(log.contains(&"opened ticket-admin".to_string()));
    assert!(log.contains(&"joined 7".to_string()));
    assert!(log.contains(&"opened ticket-9".to_string()));

    let protection = &runtime.services().protection;
    for _ in 0..3 {
        protection
            .guard("user-1", "createTicket", GuardOptions::default(), || async {})
            .await
            .unwrap();
    }
    let err = protection
        .guard("user-1", "createTicket", GuardOptions::default(), || async {})
        .await
        .unwrap_err();
    assert!(matches!(err, ProtectionError::RateLimited { .. }));
    assert!(err.retry_after_secs().unwrap() >= 1);
}
