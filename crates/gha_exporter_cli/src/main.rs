//! gha-exporter CLI - serves GitHub Actions state as Prometheus metrics.

mod config;
mod limits;
mod server;
mod shutdown;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gha_exporter::collectors::{collect_once, default_collectors, spawn_all};
use gha_exporter::metrics::parse_run_fields;
use gha_exporter::{
    Clock, ExporterContext, ExporterMetrics, GitHubClient, ReqwestTransport, Shutdown,
    StaticToken, SystemClock,
};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::limits::OutputFormat;

/// Timeout of a single GitHub API request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "gha-exporter")]
#[command(version)]
#[command(about = "Prometheus exporter for GitHub Actions")]
#[command(
    long_about = "gha-exporter polls the GitHub REST API (github.com or GitHub Enterprise \
Server) for workflow runs, jobs, self-hosted runners, and the remaining API quota, and \
serves them as Prometheus gauges."
)]
#[command(after_long_help = r#"EXAMPLES
    Export every repository of an organization:
        $ GHA_EXPORTER_GITHUB__TOKEN=ghp_... GHA_EXPORTER_GITHUB__ORGANIZATIONS=octo-org gha-exporter

    Export a fixed set of repositories on a custom port:
        $ gha-exporter serve --listen 127.0.0.1:9100

    Run every collector once and print the exposition:
        $ gha-exporter once

    Show the remaining API quota as JSON:
        $ gha-exporter limits --output json

CONFIGURATION
    gha-exporter reads configuration from:
      1. ~/.config/gha-exporter/config.toml (or $XDG_CONFIG_HOME/gha-exporter/config.toml)
      2. ./gha-exporter.toml
      3. The file given with --config
      4. Environment variables (GHA_EXPORTER_ prefix, sections split by __)
      5. .env file in current directory

ENVIRONMENT VARIABLES
    GHA_EXPORTER_GITHUB__TOKEN            GitHub token (required)
    GHA_EXPORTER_GITHUB__API_URL          API base URL (default: https://api.github.com)
    GHA_EXPORTER_GITHUB__ORGANIZATIONS    Comma-separated organizations
    GHA_EXPORTER_GITHUB__REPOSITORIES     Comma-separated owner/name list
    GHA_EXPORTER_GITHUB__ENTERPRISES      Comma-separated enterprises
    GHA_EXPORTER_GITHUB__REFRESH_SECS     Base polling interval (default: 30)
    GHA_EXPORTER_METRICS__LISTEN          Listen address (default: 0.0.0.0:9999)
    GHA_EXPORTER_METRICS__WORKFLOW_FIELDS Workflow run labels
"#)]
struct Cli {
    /// Extra config file, applied after the default locations
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll GitHub continuously and serve /metrics (default)
    Serve {
        /// Listen address (overrides metrics.listen)
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },
    /// Run every collector once and print the exposition text
    Once,
    /// Show current API rate limits
    Limits {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
}

/// Everything a command needs to talk to GitHub.
struct Exporter {
    client: Arc<GitHubClient>,
    metrics: Arc<ExporterMetrics>,
    ctx: Arc<ExporterContext>,
}

fn build_exporter(config: &Config, shutdown: Shutdown) -> Result<Exporter, Box<dyn std::error::Error>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let transport = Arc::new(ReqwestTransport::with_timeout(HTTP_TIMEOUT)?);
    let credentials = Arc::new(StaticToken::new(config.token()?));

    let client = Arc::new(
        GitHubClient::new(transport, &config.github.api_url, credentials, clock.clone())?
            .with_rate_limit(config.github.requests_per_second)
            .with_response_cache(config.github.http_cache_bytes),
    );
    tracing::debug!("Using GitHub API at {}", client.base_url());

    let metrics = Arc::new(ExporterMetrics::new(
        &config.metrics.namespace,
        parse_run_fields(&config.metrics.workflow_fields),
    )?);

    let ctx = Arc::new(
        ExporterContext::builder()
            .api(client.clone())
            .metrics(metrics.clone())
            .clock(clock)
            .shutdown(shutdown)
            .settings(config.exporter_settings())
            .cache_size_bytes(config.metrics.cache_size_bytes)
            .build()?,
    );

    Ok(Exporter {
        client,
        metrics,
        ctx,
    })
}

fn warn_if_nothing_to_poll(config: &Config) {
    let github = &config.github;
    if github.organizations.is_empty()
        && github.repositories.is_empty()
        && github.enterprises.is_empty()
    {
        tracing::warn!(
            "No organizations, repositories, or enterprises configured; only the rate limit will be exported"
        );
    }
}

async fn handle_serve(
    config: &Config,
    listen: Option<SocketAddr>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = match listen {
        Some(addr) => addr,
        None => config.listen_addr()?,
    };
    warn_if_nothing_to_poll(config);

    let (trigger, shutdown) = Shutdown::new();
    shutdown::setup_shutdown_handler(trigger);

    let exporter = build_exporter(config, shutdown.clone())?;
    let handles = spawn_all(default_collectors(&exporter.ctx), &shutdown);

    server::serve(addr, exporter.metrics, shutdown).await?;

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!("Collector task failed: {}", e);
        }
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn handle_once(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    warn_if_nothing_to_poll(config);
    let exporter = build_exporter(config, Shutdown::never())?;
    collect_once(&default_collectors(&exporter.ctx)).await;
    print!("{}", exporter.metrics.encode()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("gha_exporter=info,gha_exporter_cli=info"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load configuration (config files -> env vars -> defaults)
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve { listen: None }) {
        Commands::Serve { listen } => handle_serve(&config, listen).await?,
        Commands::Once => handle_once(&config).await?,
        Commands::Limits { output } => {
            let exporter = build_exporter(&config, Shutdown::never())?;
            limits::handle_limits(exporter.client.as_ref(), output).await?;
        }
    }

    Ok(())
}
