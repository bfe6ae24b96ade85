#![deny(unsafe_code)]

//! Convokit CLI: serve, inspect, and exercise a component directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;

use convokit_config::AppConfig;
use convokit_core::logging::LogEntry;
use convokit_core::{
    ComponentRegistry, InvocationError, InvocationShell, LogCollector, ManifestLoader,
};

/// Convokit: host conversation components for a bot platform.
#[derive(Debug, Parser)]
#[command(name = "convokit", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "convokit.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the configured component directory over HTTP.
    Serve,

    /// Print the metadata index of the configured components.
    Components {
        /// Index of one collection instead of the top level.
        #[arg(long)]
        collection: Option<String>,
    },

    /// Invoke a component once and print its response.
    Invoke {
        /// Component name.
        name: String,

        /// JSON file holding the request body.
        #[arg(short, long)]
        request: PathBuf,

        /// Resolve the component inside this collection.
        #[arg(long)]
        collection: Option<String>,
    },

    /// Discover a directory and report what was registered or skipped.
    Check {
        /// Directory to scan; defaults to the configured component directory.
        dir: Option<PathBuf>,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, found) = load_config(&cli.config).await?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose, &config))),
        )
        .with_writer(std::io::stderr)
        .init();

    if !found {
        debug!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    match cli.command {
        Commands::Serve => cmd_serve(&config).await?,
        Commands::Components { collection } => cmd_components(&config, collection.as_deref())?,
        Commands::Invoke {
            name,
            request,
            collection,
        } => cmd_invoke(&config, &name, &request, collection.as_deref()).await?,
        Commands::Check { dir } => cmd_check(&config, dir.as_deref())?,
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
    }

    Ok(())
}

/// `-v` raises the level above the configured one.
fn log_filter(verbose: u8, config: &AppConfig) -> String {
    match verbose {
        0 => config.logging.level.to_lowercase(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

async fn load_config(path: &Path) -> Result<(AppConfig, bool)> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        let config = AppConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((AppConfig::default(), false))
    }
}

fn loader(config: &AppConfig) -> ManifestLoader {
    ManifestLoader::with_extensions(&config.registry.extensions)
}

/// Assemble the configured directory, merging top-level units into every
/// collection when `recursive_merge` is set.
fn build_registry(config: &AppConfig) -> Result<ComponentRegistry> {
    let cwd = std::env::current_dir().context("reading the working directory")?;
    let dir = &config.registry.component_dir;
    let mut registry = ComponentRegistry::assemble(&loader(config), None, dir, &cwd);
    if !registry.is_valid() {
        bail!("component directory {} is not readable", dir.display());
    }
    if config.registry.recursive_merge {
        let top_level = registry.clone();
        registry.merge(&top_level, true);
    }
    Ok(registry)
}

fn build_shell(config: &AppConfig, collection: Option<&str>) -> Result<InvocationShell> {
    let shell = InvocationShell::new(Arc::new(build_registry(config)?));
    match collection {
        None => Ok(shell),
        Some(name) => shell
            .for_collection(name)
            .with_context(|| format!("no collection named `{name}`")),
    }
}

async fn cmd_serve(config: &AppConfig) -> Result<()> {
    let shell = build_shell(config, None)?;
    info!(listen = %config.listen_address(), "Starting component service");

    convokit_core::http::serve(&config.server, shell, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    })
    .await
    .context("serving components")?;
    Ok(())
}

fn cmd_components(config: &AppConfig, collection: Option<&str>) -> Result<()> {
    let shell = build_shell(config, collection)?;
    let index = shell.get_all_component_metadata();
    println!("{}", serde_json::to_string_pretty(&index)?);
    Ok(())
}

async fn cmd_invoke(
    config: &AppConfig,
    name: &str,
    request: &Path,
    collection: Option<&str>,
) -> Result<()> {
    let shell = build_shell(config, collection)?;
    let text = tokio::fs::read_to_string(request)
        .await
        .with_context(|| format!("reading {}", request.display()))?;
    let body: Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", request.display()))?;

    let response = invoke(&shell, name, body).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Invoke by registry kind, as the HTTP adapter does.
async fn invoke(shell: &InvocationShell, name: &str, body: Value) -> Result<Value> {
    let is_handler_set = shell
        .registry()
        .get_component(name)
        .is_some_and(|c| !c.is_custom());

    if is_handler_set {
        shell
            .invoke_event_handler(name, body)
            .await
            .map_err(kind_error)
    } else {
        let response = shell
            .invoke_component_by_name(name, body, None)
            .await
            .map_err(kind_error)?;
        serde_json::to_value(response).context("serializing the component response")
    }
}

/// Prefix the message with the stable error kind, as the HTTP body does.
fn kind_error(error: InvocationError) -> anyhow::Error {
    anyhow::anyhow!("{}: {error}", error.kind())
}

/// What discovery of one directory produced.
#[derive(Debug)]
struct CheckReport {
    registry: ComponentRegistry,
    problems: Vec<LogEntry>,
}

fn check(config: &AppConfig, dir: &Path) -> CheckReport {
    let collector = LogCollector::new(4096);
    let reader = collector.reader();
    let subscriber = tracing_subscriber::registry().with(collector);
    let registry = tracing::subscriber::with_default(subscriber, || {
        ComponentRegistry::assemble(&loader(config), None, dir, dir)
    });
    CheckReport {
        registry,
        problems: reader.problems(),
    }
}

fn cmd_check(config: &AppConfig, dir: Option<&Path>) -> Result<()> {
    let dir = dir.unwrap_or(&config.registry.component_dir);
    let report = check(config, dir);

    let print_units = |registry: &ComponentRegistry, indent: &str| {
        for component in registry.components() {
            let kind = component
                .metadata()
                .event_handler_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "custom".to_string());
            println!("{indent}{} ({kind})", component.name());
        }
    };

    println!("{}", dir.display());
    print_units(&report.registry, "  ");
    for name in report.registry.collection_names() {
        println!("  [{name}]");
        if let Some(collection) = report.registry.get_registry(Some(name)) {
            print_units(collection, "    ");
        }
    }

    for problem in &report.problems {
        let path = problem.field("path").unwrap_or("-");
        let detail = problem.field("error").unwrap_or("");
        eprintln!("{} {path}: {} {detail}", problem.level, problem.message);
    }

    if !report.registry.is_valid() {
        bail!("{} is not a readable directory", dir.display());
    }
    if !report.problems.is_empty() {
        bail!("{} problem(s) found", report.problems.len());
    }
    Ok(())
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("serializing configuration")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}
