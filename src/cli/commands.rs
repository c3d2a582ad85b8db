use crate::application::Application;
use crate::config::{self, Settings};
use crate::server::HttpServer;
use crate::static_files::Static;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Command-line interface for brrtweb
#[derive(Parser, Debug)]
#[command(name = "brrtweb")]
#[command(about = "brrtweb CLI", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve a directory through the static controller
    Serve {
        /// Directory (or single file) to serve
        #[arg(short, long)]
        dir: PathBuf,

        /// Document served for directory requests
        #[arg(long, default_value = "index.html")]
        default_document: String,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,

        /// Settings file (YAML or TOML)
        #[arg(short, long, env = "BRRTWEB_CONFIG")]
        config: Option<PathBuf>,

        /// Emit logs as JSON
        #[arg(long, default_value_t = false)]
        log_json: bool,
    },
    /// Print the version
    Version,
}

/// Install the global `tracing` subscriber. `RUST_LOG` wins over the
/// default `info` level.
///
/// # Errors
///
/// Fails when a subscriber is already installed.
pub fn init_logging(json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("may_minihttp::http_server=warn".parse()?);
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")
}

/// Settings from `path` (or the defaults) with environment overrides.
///
/// # Errors
///
/// Unreadable or unparsable settings file.
pub fn load_settings(path: Option<&PathBuf>) -> Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    Ok(settings.apply_env())
}

/// Run a parsed command line.
///
/// # Errors
///
/// Configuration, logging or bind failures.
pub fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            println!("brrtweb {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Serve {
            dir,
            default_document,
            addr,
            config,
            log_json,
        } => {
            init_logging(log_json)?;
            let settings = load_settings(config.as_ref())?;
            may::config().set_stack_size(settings.stack_size);
            config::configure(settings);

            let root = Static::new(&dir).with_default_document(Some(&default_document));
            let app = Application::new(root);
            let handle = HttpServer::new(app)
                .start(addr.as_str())
                .with_context(|| format!("Failed to bind {addr}"))?;
            info!(addr = %handle.addr(), dir = %dir.display(), "Serving directory");
            handle
                .join()
                .map_err(|e| anyhow::anyhow!("server thread panicked: {e:?}"))
        }
    }
}
