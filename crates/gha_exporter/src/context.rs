//! Shared exporter context.
//!
//! Everything a collector needs (API client, fetcher, dedup cache, gauges,
//! settings, and the discovered repository list) is assembled once through
//! [`ExporterContextBuilder`] and handed to every collector behind an `Arc`.
//!
//! # Example
//!
//! ```ignore
//! use gha_exporter::{ExporterContext, ExporterSettings};
//!
//! let ctx = ExporterContext::builder()
//!     .api(client)
//!     .metrics(metrics)
//!     .settings(ExporterSettings::default())
//!     .shutdown(shutdown)
//!     .build()?;
//! ```

use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::api::{ActionsApi, MAX_PER_PAGE, RepoRef};
use crate::clock::{Clock, SystemClock};
use crate::dedup::{DEFAULT_CACHE_SIZE_BYTES, DEFAULT_DEDUP_TTL_SECS, DedupCache};
use crate::fetcher::Fetcher;
use crate::metrics::ExporterMetrics;
use crate::shutdown::Shutdown;

/// Default base polling interval.
pub const DEFAULT_REFRESH_SECS: u64 = 30;

/// Repository discovery runs this many base intervals apart.
pub const DISCOVERY_INTERVAL_MULTIPLIER: u32 = 5;

/// Default look-back window for workflow runs.
pub const DEFAULT_RUN_WINDOW_SECS: i64 = 3600;

/// Error type for context construction.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// Missing required field in builder.
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    /// A setting is out of range.
    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Polling targets and tuning knobs.
#[derive(Debug, Clone)]
pub struct ExporterSettings {
    /// Base polling interval.
    pub refresh: Duration,
    /// Organizations whose repositories and runners are polled.
    pub organizations: Vec<String>,
    /// Static `owner/name` list. When non-empty, discovery makes no API calls.
    pub repositories: Vec<String>,
    /// Enterprises whose runner fleets are polled.
    pub enterprises: Vec<String>,
    /// Prefer billed run duration over `updated_at - created_at`.
    pub fetch_run_usage: bool,
    /// How far back workflow runs are fetched each cycle.
    pub run_window: chrono::Duration,
    /// Lifetime of dedup entries.
    pub dedup_ttl: chrono::Duration,
    pub per_page: u32,
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            refresh: Duration::from_secs(DEFAULT_REFRESH_SECS),
            organizations: Vec::new(),
            repositories: Vec::new(),
            enterprises: Vec::new(),
            fetch_run_usage: true,
            run_window: chrono::Duration::seconds(DEFAULT_RUN_WINDOW_SECS),
            dedup_ttl: chrono::Duration::seconds(DEFAULT_DEDUP_TTL_SECS),
            per_page: MAX_PER_PAGE,
        }
    }
}

impl ExporterSettings {
    /// Interval of the repository discovery collector.
    pub fn discovery_interval(&self) -> Duration {
        self.refresh.saturating_mul(DISCOVERY_INTERVAL_MULTIPLIER)
    }

    fn validate(&self) -> Result<(), ContextError> {
        if self.refresh.is_zero() {
            return Err(ContextError::InvalidSetting {
                name: "refresh",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.refresh.checked_mul(DISCOVERY_INTERVAL_MULTIPLIER).is_none() {
            return Err(ContextError::InvalidSetting {
                name: "refresh",
                reason: format!("{}s is too large", self.refresh.as_secs()),
            });
        }
        if self.run_window <= chrono::Duration::zero() {
            return Err(ContextError::InvalidSetting {
                name: "run_window",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.dedup_ttl <= chrono::Duration::zero() {
            return Err(ContextError::InvalidSetting {
                name: "dedup_ttl",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// The repository list polled by the workflow collector.
///
/// Discovery swaps in a whole new list; readers hold an `Arc` snapshot for the
/// duration of a cycle and never see a partial update.
#[derive(Debug)]
pub struct SharedRepositories {
    inner: RwLock<Arc<[RepoRef]>>,
}

impl Default for SharedRepositories {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Arc::from(Vec::new())),
        }
    }
}

impl SharedRepositories {
    pub fn replace(&self, repos: Vec<RepoRef>) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Arc::from(repos);
    }

    pub fn snapshot(&self) -> Arc<[RepoRef]> {
        Arc::clone(&self.inner.read().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Builder for creating an `ExporterContext`.
#[derive(Default)]
pub struct ExporterContextBuilder {
    api: Option<Arc<dyn ActionsApi>>,
    metrics: Option<Arc<ExporterMetrics>>,
    clock: Option<Arc<dyn Clock>>,
    shutdown: Option<Shutdown>,
    settings: Option<ExporterSettings>,
    cache_size_bytes: Option<usize>,
}

impl ExporterContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API client.
    pub fn api(mut self, api: Arc<dyn ActionsApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Set the gauge registry.
    pub fn metrics(mut self, metrics: Arc<ExporterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Override the wall clock. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the stop signal. Defaults to one that never fires.
    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn settings(mut self, settings: ExporterSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Byte budget of the dedup cache.
    pub fn cache_size_bytes(mut self, bytes: usize) -> Self {
        self.cache_size_bytes = Some(bytes);
        self
    }

    /// Build the context.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::MissingField` if the API client or metrics are
    /// not set, and `ContextError::InvalidSetting` for zero intervals.
    pub fn build(self) -> Result<ExporterContext, ContextError> {
        let api = self.api.ok_or(ContextError::MissingField { field: "api" })?;
        let metrics = self
            .metrics
            .ok_or(ContextError::MissingField { field: "metrics" })?;
        let settings = self.settings.unwrap_or_default();
        settings.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let shutdown = self.shutdown.unwrap_or_else(Shutdown::never);
        let cache_size = self.cache_size_bytes.unwrap_or(DEFAULT_CACHE_SIZE_BYTES);

        Ok(ExporterContext {
            fetcher: Fetcher::new(clock.clone(), settings.per_page, shutdown.clone()),
            dedup: DedupCache::new(cache_size, clock.clone()),
            api,
            metrics,
            clock,
            shutdown,
            settings,
            repositories: SharedRepositories::default(),
        })
    }
}

/// State shared by every collector.
pub struct ExporterContext {
    api: Arc<dyn ActionsApi>,
    fetcher: Fetcher,
    dedup: DedupCache,
    metrics: Arc<ExporterMetrics>,
    clock: Arc<dyn Clock>,
    shutdown: Shutdown,
    settings: ExporterSettings,
    repositories: SharedRepositories,
}

impl ExporterContext {
    pub fn builder() -> ExporterContextBuilder {
        ExporterContextBuilder::new()
    }

    pub fn api(&self) -> &dyn ActionsApi {
        self.api.as_ref()
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn settings(&self) -> &ExporterSettings {
        &self.settings
    }

    pub fn repositories(&self) -> &SharedRepositories {
        &self.repositories
    }
}
