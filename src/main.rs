use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use addon_host::application::context::RuntimeServices;
use addon_host::application::errors::RuntimeError;
use addon_host::application::services::LoadOrchestrator;
use addon_host::domain::entities::AddonNode;
use addon_host::infrastructure::adapters::console::ConsoleHost;
use addon_host::infrastructure::addons::{AddonCatalog, AddonScanner, YamlCapabilityReader};
use addon_host::infrastructure::config::Config;
use addon_host::infrastructure::database::Database;

#[derive(Parser)]
#[command(name = "addon-host")]
#[command(about = "Addon runtime for chat-bot hosts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: String,

    /// Addons directory (overrides config)
    #[arg(short, long, global = true)]
    addons_dir: Option<PathBuf>,

    /// Debug logging and phase timings
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every addon and serve console events until EOF
    Run,
    /// Print the discovered addon tree
    Scan,
    /// Generate default config
    InitConfig,
    /// Show version
    Version,
}

fn main() {
    let cli = Cli::parse();
    let config = load_config(&cli);

    // Initialize logging
    let level = if cli.verbose || config.runtime.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let result = match cli.command {
        Commands::Run => run_host(config),
        Commands::Scan => {
            scan(&config);
            Ok(())
        }
        Commands::InitConfig => init_config(),
        Commands::Version => {
            println!("addon-host v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Config {
    let mut config = if Path::new(&cli.config).exists() {
        Config::load(&cli.config).unwrap_or_else(|e| {
            eprintln!("Failed to load config: {}, using defaults", e);
            Config::default()
        })
    } else {
        Config::default()
    };

    if let Err(e) = config.apply_env() {
        eprintln!("Ignoring environment overrides: {}", e);
    }
    if let Some(ref dir) = cli.addons_dir {
        config.runtime.addons_dir = dir.clone();
    }
    config
}

fn scanner(config: &Config) -> AddonScanner {
    AddonScanner::new().with_manifest_name(config.runtime.manifest_name.clone())
}

fn scan(config: &Config) {
    fn print(nodes: &[AddonNode], depth: usize) {
        for node in nodes {
            let desc = &node.descriptor;
            println!(
                "{}{} (priority {}) {}",
                "  ".repeat(depth),
                desc.name(),
                desc.priority,
                desc.absolute_path.display()
            );
            print(&node.children, depth + 1);
        }
    }

    let tree = scanner(config).scan(&config.runtime.addons_dir);
    if tree.is_empty() {
        println!("No addons found in {}", config.runtime.addons_dir.display());
        return;
    }
    print(&tree.roots, 0);
}

fn run_host(config: Config) -> Result<(), RuntimeError> {
    let services = RuntimeServices::new(config.protection_layer()?);

    let catalog = if config.runtime.dynamic_loading {
        AddonCatalog::new().with_dynamic_loading()
    } else {
        AddonCatalog::new()
    };

    let host = Arc::new(
        ConsoleHost::stdin()
            .with_name(config.host.name.clone())
            .with_granted(config.host.granted_capabilities.clone()),
    );

    let mut orchestrator = LoadOrchestrator::new(
        scanner(&config),
        Arc::new(catalog),
        Arc::new(YamlCapabilityReader),
        host.clone(),
        services,
    )
    .with_load_timeout(config.load_timeout());

    if config.database.apply_schemas {
        let db = match config.database.path {
            Some(ref path) => Database::open(path)?,
            None => Database::in_memory()?,
        };
        orchestrator = orchestrator.with_schema_db(Arc::new(db));
    }

    let rt = tokio::runtime::Runtime::new().map_err(|e| RuntimeError::Internal(format!("Failed to start runtime: {}", e)))?;

    rt.block_on(async {
        let result = orchestrator.run(&config.runtime.addons_dir).await?;
        for outcome in result.report.failed() {
            tracing::warn!(addon = outcome.name.as_str(), status = ?outcome.status, "Addon not running");
        }
        result.runtime.serve(host.as_ref()).await;
        Ok::<(), RuntimeError>(())
    })
}

fn init_config() -> Result<(), RuntimeError> {
    let yaml = Config::default().to_yaml()?;
    println!("{}", yaml);
    println!("\nSave this to config.yaml and adjust as needed.");
    Ok(())
}
