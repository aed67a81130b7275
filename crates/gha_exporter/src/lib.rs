//! gha-exporter - GitHub Actions state as Prometheus gauges.
//!
//! This library polls the GitHub REST API (github.com or GitHub Enterprise
//! Server) for repositories, workflow runs, jobs, and self-hosted runners, and
//! republishes that state through a [`prometheus::Registry`].
//!
//! The pipeline is fetch, cache, reconcile:
//!
//! - [`fetcher`] walks paginated endpoints and waits out exhausted quotas
//! - [`dedup`] remembers terminal runs and jobs so they are written once
//! - [`collectors`] flatten API objects into gauge label sets
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gha_exporter::{ExporterContext, ExporterMetrics, GitHubClient, StaticToken};
//! use gha_exporter::collectors::{default_collectors, spawn_all};
//!
//! let client = GitHubClient::new(transport, "https://api.github.com", Arc::new(StaticToken::new(token)), clock)?;
//! let ctx = Arc::new(
//!     ExporterContext::builder()
//!         .api(Arc::new(client))
//!         .metrics(Arc::new(ExporterMetrics::new("github", fields)?))
//!         .shutdown(shutdown.clone())
//!         .build()?,
//! );
//! let handles = spawn_all(default_collectors(&ctx), &shutdown);
//! ```

pub mod api;
pub mod clock;
pub mod collectors;
pub mod context;
pub mod dedup;
pub mod fetcher;
pub mod github;
pub mod http;
pub mod metrics;
pub mod shutdown;
pub mod store;

pub use api::{ActionsApi, ApiError, CredentialProvider, Page, PageRequest, RepoRef, StaticToken};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{ContextError, ExporterContext, ExporterSettings};
pub use dedup::{DedupCache, DedupKey};
pub use fetcher::{Fetched, Fetcher};
pub use github::{GitHubClient, GitHubError};
pub use http::{HttpTransport, ReqwestTransport};
pub use metrics::{ExporterMetrics, MetricsError, RunField};
pub use shutdown::{Shutdown, ShutdownTrigger};
