//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gha_exporter::api::Result;
use gha_exporter::github::types::{
    RateLimitResponse, Repository, RunUsage, Runner, WorkflowJob, WorkflowRun,
};
use gha_exporter::metrics::{DEFAULT_NAMESPACE, DEFAULT_WORKFLOW_FIELDS, parse_run_fields};
use gha_exporter::{
    ActionsApi, ApiError, ExporterContext, ExporterMetrics, ExporterSettings, ManualClock, Page,
    PageRequest, RepoRef,
};

pub fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// Scriptable in-memory GitHub. Every call is recorded by name.
#[derive(Default)]
pub struct ScriptedGitHub {
    pub org_repos: Mutex<HashMap<String, Vec<Repository>>>,
    pub runs: Mutex<HashMap<RepoRef, Vec<WorkflowRun>>>,
    pub jobs: Mutex<HashMap<u64, Vec<WorkflowJob>>>,
    pub org_runners: Mutex<HashMap<String, Vec<Runner>>>,
    pub enterprise_runners: Mutex<HashMap<String, Vec<Runner>>>,
    pub remaining: Mutex<u64>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGitHub {
    fn record(&self, call: &str) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| *c == name).count()
    }

    pub fn set_runs(&self, repo: &RepoRef, runs: Vec<WorkflowRun>) {
        self.runs.lock().unwrap().insert(repo.clone(), runs);
    }
}

#[async_trait]
impl ActionsApi for ScriptedGitHub {
    async fn rate_limit(&self) -> Result<RateLimitResponse> {
        self.record("rate_limit");
        let mut limits = RateLimitResponse::default();
        limits.resources.core.remaining = *self.remaining.lock().unwrap();
        Ok(limits)
    }

    async fn list_org_repos(&self, org: &str, _: PageRequest) -> Result<Page<Repository>> {
        self.record("list_org_repos");
        Ok(Page::last(
            self.org_repos
                .lock()
                .unwrap()
                .get(org)
                .cloned()
                .unwrap_or_default(),
        ))
    }

    async fn list_workflow_runs(
        &self,
        repo: &RepoRef,
        _: DateTime<Utc>,
        _: PageRequest,
    ) -> Result<Page<WorkflowRun>> {
        self.record("list_workflow_runs");
        Ok(Page::last(
            self.runs.lock().unwrap().get(repo).cloned().unwrap_or_default(),
        ))
    }

    async fn list_workflow_jobs(
        &self,
        _: &RepoRef,
        run_id: u64,
        _: PageRequest,
    ) -> Result<Page<WorkflowJob>> {
        self.record("list_workflow_jobs");
        Ok(Page::last(
            self.jobs.lock().unwrap().get(&run_id).cloned().unwrap_or_default(),
        ))
    }

    async fn get_run_usage(&self, _: &RepoRef, run_id: u64) -> Result<RunUsage> {
        self.record("get_run_usage");
        Err(ApiError::not_found(format!("run {run_id} timing")))
    }

    async fn list_org_runners(&self, org: &str, _: PageRequest) -> Result<Page<Runner>> {
        self.record("list_org_runners");
        Ok(Page::last(
            self.org_runners
                .lock()
                .unwrap()
                .get(org)
                .cloned()
                .unwrap_or_default(),
        ))
    }

    async fn list_enterprise_runners(
        &self,
        enterprise: &str,
        _: PageRequest,
    ) -> Result<Page<Runner>> {
        self.record("list_enterprise_runners");
        Ok(Page::last(
            self.enterprise_runners
                .lock()
                .unwrap()
                .get(enterprise)
                .cloned()
                .unwrap_or_default(),
        ))
    }
}

pub fn context(
    api: Arc<ScriptedGitHub>,
    settings: ExporterSettings,
) -> (Arc<ManualClock>, Arc<ExporterContext>) {
    let clock = Arc::new(ManualClock::new(start()));
    let metrics = Arc::new(
        ExporterMetrics::new(DEFAULT_NAMESPACE, parse_run_fields(DEFAULT_WORKFLOW_FIELDS)).unwrap(),
    );
    let ctx = ExporterContext::builder()
        .api(api)
        .metrics(metrics)
        .clock(clock.clone())
        .settings(settings)
        .build()
        .unwrap();
    (clock, Arc::new(ctx))
}

pub fn completed_run(conclusion: &str) -> WorkflowRun {
    WorkflowRun {
        id: Some(100),
        name: Some("CI".to_string()),
        head_branch: Some("main".to_string()),
        head_sha: Some("abc".to_string()),
        run_number: Some(3),
        workflow_id: Some(7),
        event: Some("push".to_string()),
        status: Some("completed".to_string()),
        conclusion: Some(conclusion.to_string()),
        created_at: Some(start() - chrono::Duration::minutes(10)),
        updated_at: Some(start() - chrono::Duration::minutes(5)),
        ..Default::default()
    }
}

pub fn runner(id: u64, name: &str, online: bool) -> Runner {
    Runner {
        id: Some(id),
        name: Some(name.to_string()),
        os: Some("Linux".to_string()),
        status: Some(if online { "online" } else { "offline" }.to_string()),
        ..Default::default()
    }
}

/// Exposition lines of one metric family, without HELP/TYPE comments.
pub fn series<'a>(text: &'a str, name: &str) -> Vec<&'a str> {
    let prefix = format!("{name}{{");
    text.lines().filter(|l| l.starts_with(&prefix)).collect()
}
