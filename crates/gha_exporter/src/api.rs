//! The inbound API seam.
//!
//! Collectors talk to GitHub exclusively through [`ActionsApi`]. The REST
//! implementation lives in [`crate::github`]; tests substitute in-memory
//! fakes. Every list operation is exposed one page at a time so that
//! pagination and quota handling live in a single place, the
//! [`Fetcher`](crate::fetcher::Fetcher).

mod errors;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use errors::{ApiError, Result, short_error_message};

use crate::github::types::{
    RateLimitResponse, Repository, RunUsage, Runner, WorkflowJob, WorkflowRun,
};

/// Largest page size GitHub honours for list endpoints.
pub const MAX_PER_PAGE: u32 = 100;

/// A repository reference in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/name`. Anything else, including extra segments, is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let (owner, name) = s.trim().split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(owner, name))
    }

    #[inline]
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Cursor for one page of a list operation. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn first(per_page: u32) -> Self {
        Self { page: 1, per_page }
    }

    #[must_use]
    pub fn with_page(self, page: u32) -> Self {
        Self { page, ..self }
    }
}

/// One page of results plus the cursor of the following page, if any.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<u32>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page: None,
        }
    }

    pub fn with_next(items: Vec<T>, next_page: u32) -> Self {
        Self {
            items,
            next_page: Some(next_page),
        }
    }
}

/// Read-only GitHub Actions operations used by the collectors.
#[async_trait]
pub trait ActionsApi: Send + Sync {
    /// Current quota status.
    async fn rate_limit(&self) -> Result<RateLimitResponse>;

    /// One page of an organization's repositories.
    async fn list_org_repos(&self, org: &str, page: PageRequest) -> Result<Page<Repository>>;

    /// One page of runs created at or after `created_since`.
    async fn list_workflow_runs(
        &self,
        repo: &RepoRef,
        created_since: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Page<WorkflowRun>>;

    /// One page of jobs (all attempts) for a run.
    async fn list_workflow_jobs(
        &self,
        repo: &RepoRef,
        run_id: u64,
        page: PageRequest,
    ) -> Result<Page<WorkflowJob>>;

    /// Billed timing of a run. Not available on every server.
    async fn get_run_usage(&self, repo: &RepoRef, run_id: u64) -> Result<RunUsage>;

    /// One page of an organization's self-hosted runners.
    async fn list_org_runners(&self, org: &str, page: PageRequest) -> Result<Page<Runner>>;

    /// One page of an enterprise's self-hosted runners.
    async fn list_enterprise_runners(
        &self,
        enterprise: &str,
        page: PageRequest,
    ) -> Result<Page<Runner>>;
}

/// Supplies the `Authorization` header value for API requests.
///
/// Token minting (GitHub App installations, OAuth refresh) belongs to the
/// implementor; the client only asks for a header value per request.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn authorization(&self) -> Result<String>;
}

/// A fixed personal access token.
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticToken")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn authorization(&self) -> Result<String> {
        if self.token.trim().is_empty() {
            return Err(ApiError::auth("empty token"));
        }
        Ok(format!("Bearer {}", self.token.trim()))
    }
}
