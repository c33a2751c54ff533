mod api;
mod host;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use deskforge_config::{
    apply_all_defaults, config_dir, config_file_path, load_and_prepare, load_config, validate,
    write_config, HostConfig, ValidationReport,
};
use deskforge_logging::init_logger;
use deskforge_plugins::builtin_plugins;

use api::AppState;
use host::Host;

#[derive(Parser)]
#[command(name = "deskforge")]
#[command(about = "DeskForge: desktop utility plugin host")]
#[command(version)]
struct Cli {
    /// Config file (defaults to `<config dir>/config.yaml`)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the plugin host and its HTTP API
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List the built-in plugins and the menu after autostart
    Plugins,
    /// Validate a config file and print the findings
    CheckConfig {
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Write a config file with every default filled in
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Ask a running host for its health
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| config_file_path(&config_dir()));

    match cli.command {
        Commands::Serve { port } => {
            let mut config = prepare(&config_path).await?;
            if let Some(port) = port {
                config.server.get_or_insert_with(Default::default).port = Some(port);
            }
            run_server(config).await?;
        }
        Commands::Plugins => {
            let config = prepare(&config_path).await?;
            list_plugins(&config).await;
        }
        Commands::CheckConfig { path } => {
            let path = path.unwrap_or(config_path);
            check_config(&path).await?;
        }
        Commands::InitConfig { force } => {
            if config_path.exists() && !force {
                bail!("{} already exists; pass --force to overwrite", config_path.display());
            }
            write_config(&apply_all_defaults(HostConfig::default()), &config_path).await?;
            println!("Wrote {}", config_path.display());
        }
        Commands::Status => {
            let config = load_and_prepare(&config_path).await?;
            let url = format!("http://{}:{}/api/health", config.bind_address(), config.port());
            match reqwest::get(&url).await {
                Ok(resp) => {
                    let body: serde_json::Value = resp.json().await?;
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Err(_) => println!("DeskForge is not running at {url}"),
            }
        }
    }

    Ok(())
}

/// Load the config, then start logging with its settings.
async fn prepare(path: &Path) -> Result<HostConfig> {
    let config = load_and_prepare(path).await?;
    init_logger(config.log_dir().map(Path::new), config.log_level());
    // The subscriber did not exist while the config was loading.
    for warning in validate(&config).warnings {
        warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    Ok(config)
}

async fn run_server(config: HostConfig) -> Result<()> {
    info!(
        port = config.port(),
        bind = %config.bind_address(),
        "Starting DeskForge host"
    );

    let plugins = builtin_plugins(Duration::from_millis(config.clock_interval_ms()));
    let host = Arc::new(Host::start(&config, plugins).await);

    let app = api::build_router(Arc::new(AppState {
        host: Arc::clone(&host),
    }))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.bind_address(), config.port());
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    host.shutdown().await;
    info!("DeskForge host stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn list_plugins(config: &HostConfig) {
    let plugins = builtin_plugins(Duration::from_millis(config.clock_interval_ms()));

    println!("{:<22} {:<12} {:<8} {:<6}", "ID", "NAME", "PAGE", "MENU");
    for plugin in &plugins {
        let flags = plugin.flags();
        println!(
            "{:<22} {:<12} {:<8} {:<6}",
            plugin.metadata().id,
            plugin.metadata().name,
            flags.has_page,
            flags.show_in_menu
        );
    }

    let host = Host::start(config, plugins).await;
    println!();
    println!("{:<10} {}", "STATE", "PLUGIN");
    for snapshot in host.plugins().await {
        println!("{:<10} {}", snapshot.state.to_string(), snapshot.id);
    }
    println!();
    println!("Menu:");
    for item in host.nav_items() {
        println!("  {:<12} {:<26} {}", item.label, item.path, item.icon);
    }
    host.shutdown().await;
}

async fn check_config(path: &Path) -> Result<()> {
    let config = apply_all_defaults(load_config(path).await?);
    let report = validate(&config);
    print_report(path, &report);
    if !report.is_valid() {
        bail!("{} error(s) in {}", report.errors.len(), path.display());
    }
    Ok(())
}

fn print_report(path: &Path, report: &ValidationReport) {
    println!("Checked {}", path.display());
    for error in &report.errors {
        println!("  error   {}: {}", error.path, error.message);
    }
    for warning in &report.warnings {
        println!("  warning {}: {}", warning.path, warning.message);
    }
    if report.errors.is_empty() && report.warnings.is_empty() {
        println!("  no findings");
    }
}
