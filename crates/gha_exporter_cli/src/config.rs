//! Configuration file support for gha-exporter.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. Environment variables (prefixed with `GHA_EXPORTER_`, sections split by
//!    `__`, e.g. `GHA_EXPORTER_GITHUB__TOKEN`)
//! 2. The file passed with `--config`
//! 3. `./gha-exporter.toml`
//! 4. `~/.config/gha-exporter/config.toml`
//! 5. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."  # or use GHA_EXPORTER_GITHUB__TOKEN
//! api_url = "https://github.example.com"  # enterprise server, /api/v3 is appended
//! organizations = ["octo-org"]
//! repositories = []  # static owner/name list, disables discovery
//! enterprises = ["octo-enterprise"]
//! refresh_secs = 30
//! requests_per_second = 0
//!
//! [metrics]
//! listen = "0.0.0.0:9999"
//! namespace = "github"
//! workflow_fields = "repo,id,node_id,head_branch,head_sha,run_number,workflow_id,workflow,event,status"
//! fetch_workflow_run_usage = true
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config as ConfigBuilder, ConfigError, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

use gha_exporter::ExporterSettings;
use gha_exporter::api::MAX_PER_PAGE;
use gha_exporter::context::{DEFAULT_REFRESH_SECS, DEFAULT_RUN_WINDOW_SECS};
use gha_exporter::dedup::DEFAULT_CACHE_SIZE_BYTES;
use gha_exporter::github::{DEFAULT_API_URL, DEFAULT_HTTP_CACHE_BYTES};
use gha_exporter::metrics::{DEFAULT_NAMESPACE, DEFAULT_WORKFLOW_FIELDS};

/// Prefix of environment variables read by the exporter.
const ENV_PREFIX: &str = "GHA_EXPORTER";

/// Keys whose environment values are comma-separated lists.
const LIST_KEYS: [&str; 3] = [
    "github.organizations",
    "github.repositories",
    "github.enterprises",
];

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GitHub API access and polling targets.
    pub github: GitHubConfig,
    /// Exposition settings.
    pub metrics: MetricsConfig,
}

/// GitHub configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// API token. Can also be set via GHA_EXPORTER_GITHUB__TOKEN.
    pub token: Option<String>,
    /// github.com or an enterprise server base URL.
    pub api_url: String,
    pub organizations: Vec<String>,
    /// Static `owner/name` list. Takes precedence over organization discovery.
    pub repositories: Vec<String>,
    pub enterprises: Vec<String>,
    /// Base polling interval in seconds.
    pub refresh_secs: u64,
    pub per_page: u32,
    /// Client-side pacing. Zero disables it.
    pub requests_per_second: u32,
    /// Budget of the ETag response cache. Zero disables conditional requests.
    pub http_cache_bytes: usize,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
            organizations: Vec::new(),
            repositories: Vec::new(),
            enterprises: Vec::new(),
            refresh_secs: DEFAULT_REFRESH_SECS,
            per_page: MAX_PER_PAGE,
            requests_per_second: 0,
            http_cache_bytes: DEFAULT_HTTP_CACHE_BYTES,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Address the `/metrics` server binds to.
    pub listen: String,
    /// Prefix of every metric name.
    pub namespace: String,
    /// Comma-separated run fields that become workflow run labels.
    pub workflow_fields: String,
    /// Use the billed timing endpoint for run durations.
    pub fetch_workflow_run_usage: bool,
    /// Memory budget of the dedup cache.
    pub cache_size_bytes: usize,
    /// How far back workflow runs are polled.
    pub run_window_secs: i64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:9999".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            workflow_fields: DEFAULT_WORKFLOW_FIELDS.to_string(),
            fetch_workflow_run_usage: true,
            cache_size_bytes: DEFAULT_CACHE_SIZE_BYTES,
            run_window_secs: DEFAULT_RUN_WINDOW_SECS,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. XDG config file (~/.config/gha-exporter/config.toml)
    /// 2. Local config file (./gha-exporter.toml)
    /// 3. `explicit`, which must exist when given
    /// 4. Environment variables with the GHA_EXPORTER_ prefix
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "gha-exporter") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let local_config = PathBuf::from("gha-exporter.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./gha-exporter.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        if let Some(path) = explicit {
            tracing::debug!("Loading config from {:?}", path);
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder
            .add_source(environment())
            .build()?
            .try_deserialize::<Config>()
    }

    /// The API token, which every command needs.
    pub fn token(&self) -> Result<&str, ConfigError> {
        self.github
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                ConfigError::Message(
                    "No GitHub token configured. Set github.token or GHA_EXPORTER_GITHUB__TOKEN."
                        .to_string(),
                )
            })
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.metrics.listen.parse().map_err(|e| {
            ConfigError::Message(format!(
                "Invalid metrics.listen '{}': {}",
                self.metrics.listen, e
            ))
        })
    }

    /// Collector settings derived from this configuration.
    pub fn exporter_settings(&self) -> ExporterSettings {
        ExporterSettings {
            refresh: Duration::from_secs(self.github.refresh_secs),
            organizations: self.github.organizations.clone(),
            repositories: self.github.repositories.clone(),
            enterprises: self.github.enterprises.clone(),
            fetch_run_usage: self.metrics.fetch_workflow_run_usage,
            run_window: chrono::Duration::seconds(self.metrics.run_window_secs),
            per_page: self.github.per_page,
            ..Default::default()
        }
    }
}

/// Environment source: `GHA_EXPORTER_METRICS__LISTEN` maps to `metrics.listen`.
fn environment() -> Environment {
    let mut env = Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .try_parsing(true);
    for key in LIST_KEYS {
        env = env.with_list_parse_key(key);
    }
    env
}
