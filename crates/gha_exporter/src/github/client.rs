//! REST client for the GitHub Actions endpoints the exporter polls.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use url::Url;

use super::conditional::{CachedResponse, ResponseCache};
use super::error::{GitHubError, error_message, rate_limit_reset};
use super::pagination::parse_link_header;
use super::rate_limit::{ApiRateLimiter, parse_rate_limit_headers};
use super::types::{
    RateLimitResource, RateLimitResponse, Repository, RunUsage, Runner, RunnerList, WorkflowJob,
    WorkflowJobList, WorkflowRun, WorkflowRunList,
};
use crate::api::{self, ActionsApi, CredentialProvider, Page, PageRequest, RepoRef};
use crate::clock::Clock;
use crate::http::{HttpRequest, HttpTransport};

/// Public github.com API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com/";

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

/// Normalize a configured API URL into a base that relative paths can extend.
///
/// GitHub Enterprise Server serves the REST API under `/api/v3/`. That suffix
/// is appended unless the path already carries it or the host is a dedicated
/// API host (`api.github.com`, `api.<tenant>.ghe.com`, `x.api.example.com`).
pub fn normalize_api_base_url(raw: &str) -> Result<Url, GitHubError> {
    let invalid = |reason: &str| GitHubError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let mut url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    let host = url
        .host_str()
        .ok_or_else(|| invalid("missing host"))?
        .to_ascii_lowercase();

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    let api_host = host.starts_with("api.") || host.contains(".api.");
    if !api_host && !url.path().ends_with("/api/v3/") {
        let path = format!("{}api/v3/", url.path());
        url.set_path(&path);
    }

    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// GitHub REST implementation of [`ActionsApi`].
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
    clock: Arc<dyn Clock>,
    rate_limiter: Option<ApiRateLimiter>,
    response_cache: Option<ResponseCache>,
    last_rate_limit: Mutex<Option<RateLimitResource>>,
}

impl GitHubClient {
    /// Create a client for `api_url` (github.com or an enterprise server).
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        api_url: &str,
        credentials: Arc<dyn CredentialProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GitHubError> {
        Ok(Self {
            transport,
            base_url: normalize_api_base_url(api_url)?,
            credentials,
            clock,
            rate_limiter: None,
            response_cache: None,
            last_rate_limit: Mutex::new(None),
        })
    }

    /// Pace requests to at most `requests_per_second`. Zero leaves pacing off.
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.rate_limiter = ApiRateLimiter::new(requests_per_second);
        self
    }

    /// Enable ETag conditional requests backed by `capacity_bytes` of bodies.
    /// Zero leaves the cache off.
    #[must_use]
    pub fn with_response_cache(mut self, capacity_bytes: usize) -> Self {
        self.response_cache =
            (capacity_bytes > 0).then(|| ResponseCache::new(capacity_bytes, self.clock.clone()));
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Quota state from the most recent response that reported it.
    pub fn last_rate_limit(&self) -> Option<RateLimitResource> {
        self.last_rate_limit
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GitHubError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GitHubError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn paged(mut url: Url, page: PageRequest) -> Url {
        url.query_pairs_mut()
            .append_pair("per_page", &page.per_page.to_string())
            .append_pair("page", &page.page.to_string());
        url
    }

    /// GET `url` and decode the body, returning the `rel="next"` page if any.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<(T, Option<u32>), GitHubError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.wait().await;
        }

        let authorization = self
            .credentials
            .authorization()
            .await
            .map_err(|e| GitHubError::Credentials(e.to_string()))?;

        let key = url.as_str();
        let cached = self.response_cache.as_ref().and_then(|c| c.lookup(key));

        let mut request = HttpRequest::get(key)
            .header("Accept", ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("Authorization", authorization);
        if let Some(entry) = &cached {
            request = request.header("If-None-Match", entry.etag.clone());
        }

        let response = self.transport.send(request).await?;

        if let Some(quota) = parse_rate_limit_headers(&response.headers) {
            tracing::trace!(remaining = quota.remaining, limit = quota.limit, "Quota update");
            *self.last_rate_limit.lock().unwrap_or_else(|e| e.into_inner()) = Some(quota);
        }

        if response.status == 304 {
            let entry = cached.ok_or_else(|| GitHubError::Status {
                status: 304,
                message: "not modified, but nothing cached".to_string(),
            })?;
            tracing::trace!(url = key, "Served from response cache");
            return Ok((serde_json::from_slice(&entry.body)?, entry.next_page));
        }

        if !response.is_success() {
            if let Some(reset_at) = rate_limit_reset(&response, self.clock.now()) {
                return Err(GitHubError::RateLimited { reset_at });
            }
            return Err(GitHubError::Status {
                status: response.status,
                message: error_message(&response.body),
            });
        }

        let next_page = response
            .header("link")
            .map(parse_link_header)
            .and_then(|link| link.next_page);
        let etag = response.header("etag").map(str::to_string);
        let data = serde_json::from_slice(&response.body)?;

        if let (Some(cache), Some(etag)) = (&self.response_cache, etag) {
            cache.store(
                key,
                CachedResponse {
                    etag,
                    body: response.body,
                    next_page,
                },
            );
        }

        Ok((data, next_page))
    }
}

fn page_of<T>(items: Vec<T>, next_page: Option<u32>) -> Page<T> {
    Page { items, next_page }
}

#[async_trait]
impl ActionsApi for GitHubClient {
    async fn rate_limit(&self) -> api::Result<RateLimitResponse> {
        let url = self.endpoint(&["rate_limit"])?;
        let (limits, _) = self.get_json(url).await?;
        Ok(limits)
    }

    async fn list_org_repos(&self, org: &str, page: PageRequest) -> api::Result<Page<Repository>> {
        let url = Self::paged(self.endpoint(&["orgs", org, "repos"])?, page);
        let (repos, next) = self.get_json::<Vec<Repository>>(url).await?;
        Ok(page_of(repos, next))
    }

    async fn list_workflow_runs(
        &self,
        repo: &RepoRef,
        created_since: DateTime<Utc>,
        page: PageRequest,
    ) -> api::Result<Page<WorkflowRun>> {
        let mut url = self.endpoint(&["repos", &repo.owner, &repo.name, "actions", "runs"])?;
        url.query_pairs_mut().append_pair(
            "created",
            &format!(">={}", created_since.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        let (list, next) = self
            .get_json::<WorkflowRunList>(Self::paged(url, page))
            .await?;
        Ok(page_of(list.workflow_runs, next))
    }

    async fn list_workflow_jobs(
        &self,
        repo: &RepoRef,
        run_id: u64,
        page: PageRequest,
    ) -> api::Result<Page<WorkflowJob>> {
        let run_id = run_id.to_string();
        let mut url = self.endpoint(&[
            "repos", &repo.owner, &repo.name, "actions", "runs", &run_id, "jobs",
        ])?;
        url.query_pairs_mut().append_pair("filter", "all");
        let (list, next) = self
            .get_json::<WorkflowJobList>(Self::paged(url, page))
            .await?;
        Ok(page_of(list.jobs, next))
    }

    async fn get_run_usage(&self, repo: &RepoRef, run_id: u64) -> api::Result<RunUsage> {
        let run_id = run_id.to_string();
        let url = self.endpoint(&[
            "repos", &repo.owner, &repo.name, "actions", "runs", &run_id, "timing",
        ])?;
        let (usage, _) = self.get_json(url).await?;
        Ok(usage)
    }

    async fn list_org_runners(&self, org: &str, page: PageRequest) -> api::Result<Page<Runner>> {
        let url = Self::paged(self.endpoint(&["orgs", org, "actions", "runners"])?, page);
        let (list, next) = self.get_json::<RunnerList>(url).await?;
        Ok(page_of(list.runners, next))
    }

    async fn list_enterprise_runners(
        &self,
        enterprise: &str,
        page: PageRequest,
    ) -> api::Result<Page<Runner>> {
        let url = Self::paged(
            self.endpoint(&["enterprises", enterprise, "actions", "runners"])?,
            page,
        );
        let (list, next) = self.get_json::<RunnerList>(url).await?;
        Ok(page_of(list.runners, next))
    }
}
