use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::Collector;
use crate::api::RepoRef;
use crate::context::ExporterContext;

/// Maintains the repository list the workflow collector polls.
pub struct RepositoryDiscovery {
    ctx: Arc<ExporterContext>,
}

impl RepositoryDiscovery {
    pub fn new(ctx: Arc<ExporterContext>) -> Self {
        Self { ctx }
    }

    /// Resolve the current repository list.
    ///
    /// A static list is returned as configured, minus entries that are not
    /// `owner/name`, without touching the API. Otherwise every configured
    /// organization is listed and the results are unioned in first-seen order.
    pub async fn discover(&self) -> Vec<RepoRef> {
        let settings = self.ctx.settings();

        if !settings.repositories.is_empty() {
            return settings
                .repositories
                .iter()
                .filter_map(|entry| {
                    let parsed = RepoRef::parse(entry);
                    if parsed.is_none() {
                        tracing::warn!(entry = %entry, "Ignoring repository entry, expected owner/name");
                    }
                    parsed
                })
                .collect();
        }

        let api = self.ctx.api();
        let mut seen = HashSet::new();
        let mut repos = Vec::new();

        for org in &settings.organizations {
            let org = org.as_str();
            let listed = self
                .ctx
                .fetcher()
                .fetch_all("list_org_repos", org, move |page| api.list_org_repos(org, page))
                .await;

            tracing::debug!(org, count = listed.len(), "Listed organization repositories");
            for repo in listed.iter().filter_map(|r| r.repo_ref()) {
                if seen.insert(repo.clone()) {
                    repos.push(repo);
                }
            }
        }

        repos
    }
}

#[async_trait]
impl Collector for RepositoryDiscovery {
    fn name(&self) -> &'static str {
        "discovery"
    }

    fn interval(&self) -> Duration {
        self.ctx.settings().discovery_interval()
    }

    async fn collect(&self) {
        let repos = self.discover().await;
        let shared = self.ctx.repositories();

        // An empty listing is almost always a failed fetch; keep the old list.
        if repos.is_empty() && !shared.snapshot().is_empty() {
            tracing::warn!("Discovery found no repositories, keeping previous list");
            return;
        }

        tracing::info!(count = repos.len(), "Repository list refreshed");
        shared.replace(repos);
    }
}
