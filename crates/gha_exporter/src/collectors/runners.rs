use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::Collector;
use crate::context::ExporterContext;
use crate::metrics::runner_label_values;

/// Which runner inventory a collector polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerScope {
    /// `GET /orgs/{org}/actions/runners` for each configured organization.
    Organization,
    /// `GET /enterprises/{enterprise}/actions/runners` for each configured enterprise.
    Fleet,
}

impl RunnerScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Fleet => "fleet",
        }
    }
}

impl fmt::Display for RunnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publishes the online state of every runner in one scope.
///
/// Runner series are fully replaced each cycle. Series this collector wrote
/// last cycle that are absent from the new inventory are removed from the
/// registry; series of the other scope are never touched.
pub struct RunnerCollector {
    ctx: Arc<ExporterContext>,
    scope: RunnerScope,
    previous: Mutex<HashSet<Vec<String>>>,
}

impl RunnerCollector {
    pub fn new(ctx: Arc<ExporterContext>, scope: RunnerScope) -> Self {
        Self {
            ctx,
            scope,
            previous: Mutex::new(HashSet::new()),
        }
    }

    /// Fetch the inventory of every owner in scope as `(labels, online)` pairs.
    async fn inventory(&self) -> Vec<(Vec<String>, bool)> {
        let settings = self.ctx.settings();
        let owners = match self.scope {
            RunnerScope::Organization => &settings.organizations,
            RunnerScope::Fleet => &settings.enterprises,
        };
        let api = self.ctx.api();
        let scope = self.scope;
        let mut series = Vec::new();

        for owner in owners {
            let owner = owner.as_str();
            let operation = match scope {
                RunnerScope::Organization => "list_org_runners",
                RunnerScope::Fleet => "list_enterprise_runners",
            };
            let runners = self
                .ctx
                .fetcher()
                .fetch_all(operation, owner, move |page| match scope {
                    RunnerScope::Organization => api.list_org_runners(owner, page),
                    RunnerScope::Fleet => api.list_enterprise_runners(owner, page),
                })
                .await;

            tracing::debug!(scope = %scope, owner, count = runners.len(), "Fetched runners");
            series.extend(runners.iter().map(|runner| {
                (
                    runner_label_values(scope.as_str(), owner, runner).to_vec(),
                    runner.is_online(),
                )
            }));
        }

        series
    }

    /// Run one cycle and return the number of series removed.
    pub async fn refresh(&self) -> usize {
        let current = self.inventory().await;
        let metrics = self.ctx.metrics();

        let current_labels: HashSet<Vec<String>> =
            current.iter().map(|(labels, _)| labels.clone()).collect();

        let mut previous = self.previous.lock().unwrap_or_else(|e| e.into_inner());
        let mut removed = 0;
        for stale in previous.difference(&current_labels) {
            if metrics.remove_runner(stale) {
                removed += 1;
            }
        }

        for (labels, online) in &current {
            metrics.set_runner(labels, *online);
        }
        *previous = current_labels;

        tracing::info!(
            scope = %self.scope,
            runners = current.len(),
            removed,
            "Runner cycle complete"
        );
        removed
    }
}

#[async_trait]
impl Collector for RunnerCollector {
    fn name(&self) -> &'static str {
        match self.scope {
            RunnerScope::Organization => "runners_organization",
            RunnerScope::Fleet => "runners_fleet",
        }
    }

    fn interval(&self) -> Duration {
        self.ctx.settings().refresh
    }

    async fn collect(&self) {
        self.refresh().await;
    }
}
