//! Polling collectors.
//!
//! Each collector owns one slice of the exported state and runs as an
//! independent loop: collect, sleep its interval, repeat until shutdown.
//! Collectors never read each other's output; the only shared inputs are the
//! repository list (written by discovery) and the context.

mod discovery;
mod rate_limit;
mod runners;
mod workflows;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

pub use discovery::RepositoryDiscovery;
pub use rate_limit::RateLimitCollector;
pub use runners::{RunnerCollector, RunnerScope};
pub use workflows::{CycleStats, WorkflowCollector, job_key, run_key};

use crate::context::ExporterContext;
use crate::shutdown::{Shutdown, Wake};

/// One periodic unit of work.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Name used in log records.
    fn name(&self) -> &'static str;

    /// Pause between the end of one cycle and the start of the next.
    fn interval(&self) -> Duration;

    /// Run one cycle. Failures are logged inside; a cycle never aborts the loop.
    async fn collect(&self);
}

/// Drive `collector` until `shutdown` fires.
pub async fn run_collector(collector: Arc<dyn Collector>, shutdown: Shutdown) {
    let name = collector.name();
    let interval = collector.interval();
    tracing::info!(collector = name, interval_secs = interval.as_secs(), "Collector started");

    while !shutdown.is_stopped() {
        collector.collect().await;
        if shutdown.sleep(interval).await == Wake::Stopped {
            break;
        }
    }

    tracing::info!(collector = name, "Collector stopped");
}

/// The collectors a context is configured for, in dependency order.
///
/// Discovery comes first so a one-shot pass has repositories to reconcile.
/// Runner collectors are only included for scopes with configured owners.
pub fn default_collectors(ctx: &Arc<ExporterContext>) -> Vec<Arc<dyn Collector>> {
    let settings = ctx.settings();
    let mut collectors: Vec<Arc<dyn Collector>> = vec![
        Arc::new(RepositoryDiscovery::new(Arc::clone(ctx))),
        Arc::new(WorkflowCollector::new(Arc::clone(ctx))),
    ];
    if !settings.organizations.is_empty() {
        collectors.push(Arc::new(RunnerCollector::new(
            Arc::clone(ctx),
            RunnerScope::Organization,
        )));
    }
    if !settings.enterprises.is_empty() {
        collectors.push(Arc::new(RunnerCollector::new(Arc::clone(ctx), RunnerScope::Fleet)));
    }
    collectors.push(Arc::new(RateLimitCollector::new(Arc::clone(ctx))));
    collectors
}

/// Spawn one task per collector.
pub fn spawn_all(collectors: Vec<Arc<dyn Collector>>, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
    collectors
        .into_iter()
        .map(|collector| tokio::spawn(run_collector(collector, shutdown.clone())))
        .collect()
}

/// Run a single cycle of each collector, in order.
pub async fn collect_once(collectors: &[Arc<dyn Collector>]) {
    for collector in collectors {
        tracing::debug!(collector = collector.name(), "Running single cycle");
        collector.collect().await;
    }
}
