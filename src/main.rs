use std::path::PathBuf;

use clap::Parser;
use sweeper::{
    config::SweeperConfig,
    observability::{self, metrics},
    retention::{EngineOptions, RetentionEngine},
};

/// CLI arguments for the sweeper
#[derive(Parser, Debug)]
#[command(version, about = "Disk retention sweeper", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./sweeper.toml if it exists,
    /// otherwise the built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run the scheduled sweeper until interrupted (default)
    Serve,
    /// Run one pass now and print the report as JSON
    Run {
        /// Only sweep this category
        #[arg(long)]
        category: Option<String>,
        /// Log what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the occupancy of every managed directory as JSON
    Stats,
    /// Initialize a new configuration file
    Init {
        /// Path to create the config file (defaults to ./sweeper.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Validate the configuration and list the managed directories
    Check,
    /// Export the JSON schema for the configuration file
    Schema {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
}

const DEFAULT_CONFIG_FILE: &str = "sweeper.toml";

/// Default configuration written by `sweeper init`.
fn default_config_toml() -> String {
    let base = std::env::temp_dir().join("sweeper");
    let path = |name: &str| base.join(name).to_string_lossy().into_owned();

    format!(
        r#"# Sweeper configuration

[observability.logging]
level = "info"
format = "compact"

[observability.metrics]
enabled = false
listen = "127.0.0.1:9464"

[retention]
enabled = true
tick_secs = 60
full_pass_interval_secs = 3600
run_on_start = true

[retention.safety]
dry_run = false
max_deletes_per_run = 0

[[retention.categories]]
name = "tts_temp"
path = '{tts}'
max_age_hours = 24
max_size_mb = 100
file_patterns = ["*.wav", "*.mp3", "*.ogg"]
interval_secs = 1800

[[retention.categories]]
name = "logs"
path = '{logs}'
max_age_hours = 168
max_size_mb = 500
file_patterns = ["*.log", "*.txt"]
interval_secs = 7200

[[retention.categories]]
name = "cache"
path = '{cache}'
max_age_hours = 24
max_size_mb = 50
file_patterns = ["*.cache", "*.tmp"]
interval_secs = 21600
"#,
        tts = path("tts"),
        logs = path("logs"),
        cache = path("cache"),
    )
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Init { output, force }) => {
            run_init(output, force);
        }
        Some(Command::Schema { output }) => {
            #[cfg(feature = "json-schema")]
            run_schema_export(output);
            #[cfg(not(feature = "json-schema"))]
            {
                let _ = output;
                eprintln!("Error: JSON schema export requires the 'json-schema' feature");
                std::process::exit(1);
            }
        }
        Some(Command::Check) => {
            run_check(args.config.as_deref());
        }
        Some(Command::Run { category, dry_run }) => {
            run_once(args.config.as_deref(), category, dry_run).await;
        }
        Some(Command::Stats) => {
            run_stats(args.config.as_deref()).await;
        }
        Some(Command::Serve) | None => {
            run_server(args.config.as_deref()).await;
        }
    }
}

/// Load the config file, or fall back to defaults when none is found.
fn load_config(explicit_path: Option<&str>) -> SweeperConfig {
    let path = match explicit_path {
        Some(path) => {
            let path = PathBuf::from(path);
            if !path.exists() {
                eprintln!("Config file not found: {}", path.display());
                std::process::exit(1);
            }
            Some(path)
        }
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
    };

    let Some(path) = path else {
        return SweeperConfig::default();
    };

    match SweeperConfig::from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn build_engine(config: &SweeperConfig, dry_run: bool) -> RetentionEngine {
    let registry = match sweeper::retention::PolicyRegistry::from_config(&config.retention) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Invalid retention configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut options = EngineOptions::from_config(&config.retention);
    options.dry_run |= dry_run;
    RetentionEngine::new(registry, options)
}

fn init_observability(config: &SweeperConfig) {
    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize output: {}", e);
            std::process::exit(1);
        }
    }
}

/// Run the scheduled sweeper until Ctrl+C or SIGTERM.
async fn run_server(config_path: Option<&str>) {
    let config = load_config(config_path);
    init_observability(&config);

    if let Err(e) = metrics::init_metrics(&config.observability.metrics) {
        tracing::error!(error = %e, "Failed to initialize metrics");
        std::process::exit(1);
    }

    if !config.retention.enabled {
        tracing::info!("Retention is disabled in config, nothing to do");
        return;
    }

    let engine = build_engine(&config, false);
    engine.start();

    shutdown_signal().await;

    tracing::info!("Shutdown signal received, waiting for in-flight passes to complete...");
    engine.shutdown().await;
    tracing::info!("Sweeper stopped");
}

/// Run one pass over one category or all of them.
async fn run_once(config_path: Option<&str>, category: Option<String>, dry_run: bool) {
    let config = load_config(config_path);
    init_observability(&config);
    let engine = build_engine(&config, dry_run);

    match category {
        Some(name) => match engine.run_category(&name).await {
            Ok(report) => print_json(&report),
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        },
        None => print_json(&engine.run_all().await),
    }
}

async fn run_stats(config_path: Option<&str>) {
    let config = load_config(config_path);
    init_observability(&config);
    let engine = build_engine(&config, false);
    print_json(&engine.stats().await);
}

fn run_check(config_path: Option<&str>) {
    let config = load_config(config_path);
    let engine = build_engine(&config, false);
    let options = engine.options();

    println!(
        "Configuration OK: tick {}s, full pass every {}s{}",
        options.tick.as_secs(),
        options.full_pass_interval.as_secs(),
        if options.dry_run { " (dry run)" } else { "" }
    );
    for policy in engine.registry().iter() {
        let patterns: Vec<&str> = policy.file_patterns.iter().map(|p| p.as_str()).collect();
        println!(
            "  {:<12} {}  max_age={}s max_size={}B every {}s [{}]{}",
            policy.category,
            policy.directory.display(),
            policy.max_age_secs,
            policy.max_total_bytes,
            policy.interval.as_secs(),
            patterns.join(", "),
            if policy.directory.exists() { "" } else { " (missing)" }
        );
    }
}

/// Initialize a new configuration file
fn run_init(output: Option<String>, force: bool) {
    let output_path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    // Create parent directories if needed
    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, default_config_toml()) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("To start the sweeper, run:");
    println!("  sweeper serve --config {}", output_path.display());
}

#[cfg(feature = "json-schema")]
fn run_schema_export(output: Option<String>) {
    let content = match serde_json::to_string_pretty(&SweeperConfig::json_schema()) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Failed to serialize schema: {}", e);
            std::process::exit(1);
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &content) {
                eprintln!("Failed to write to {}: {}", path, e);
                std::process::exit(1);
            }
            eprintln!("Config JSON schema written to {}", path);
        }
        None => {
            println!("{}", content);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
