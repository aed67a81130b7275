//! Workflow run and job reconciliation.
//!
//! Every cycle re-fetches the runs created inside the fetch window and their
//! jobs, then flattens them into gauge label sets. Terminal observations are
//! written once and remembered in the dedup cache; non-terminal runs are
//! rewritten every cycle until they finish. A terminal run is only remembered
//! after its job listing completed, so a failed listing is retried next cycle.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Collector;
use crate::api::RepoRef;
use crate::context::ExporterContext;
use crate::dedup::DedupKey;
use crate::github::types::{WorkflowJob, WorkflowRun, job_status_code, run_status_code};
use crate::metrics::job_label_values;

/// Counters for one reconciliation cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub repositories: usize,
    pub runs_seen: usize,
    pub runs_written: usize,
    pub runs_cached: usize,
    pub jobs_seen: usize,
    pub jobs_written: usize,
    pub jobs_cached: usize,
    /// Series dropped because the same run or job was written with new labels.
    pub series_replaced: usize,
    pub series_pruned: usize,
}

/// Dedup key of a terminal run observation. `None` while the run is in flight.
pub fn run_key(repo: &RepoRef, run: &WorkflowRun) -> Option<DedupKey> {
    run.is_terminal().then(|| {
        let workflow_id = run.workflow_id.unwrap_or_default().to_string();
        let run_number = run.run_number.unwrap_or_default().to_string();
        DedupKey::from_parts(
            "run",
            &[
                &repo.full_name(),
                &workflow_id,
                run.head_sha.as_deref().unwrap_or_default(),
                &run_number,
                run.status.as_deref().unwrap_or_default(),
                run.conclusion.as_deref().unwrap_or_default(),
            ],
        )
    })
}

/// Dedup key of a completed job observation. `None` while the job is in flight.
pub fn job_key(repo: &RepoRef, run: &WorkflowRun, job: &WorkflowJob) -> Option<DedupKey> {
    job.is_completed().then(|| {
        let workflow_id = run.workflow_id.unwrap_or_default().to_string();
        let run_number = run.run_number.unwrap_or_default().to_string();
        let job_id = job.id.unwrap_or_default().to_string();
        DedupKey::from_parts(
            "job",
            &[
                &repo.full_name(),
                &workflow_id,
                run.head_sha.as_deref().unwrap_or_default(),
                &run_number,
                run.status.as_deref().unwrap_or_default(),
                run.conclusion.as_deref().unwrap_or_default(),
                &job_id,
                job.status.as_deref().unwrap_or_default(),
                job.conclusion.as_deref().unwrap_or_default(),
            ],
        )
    })
}

/// Identity of a run or job that survives changes of its mutable labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SeriesId {
    Run { repo: String, run_id: u64 },
    Job { repo: String, run_id: u64, job_id: u64 },
    /// Objects without an API id are tracked by their labels alone.
    Labels(Vec<String>),
}

#[derive(Debug, Clone, Copy)]
enum SeriesKind {
    Run,
    Job,
}

struct Written {
    labels: Vec<String>,
    at: DateTime<Utc>,
}

/// Label set and write time of every series this collector owns.
#[derive(Default)]
struct WrittenSeries {
    runs: HashMap<SeriesId, Written>,
    jobs: HashMap<SeriesId, Written>,
}

impl WrittenSeries {
    fn of(&mut self, kind: SeriesKind) -> &mut HashMap<SeriesId, Written> {
        match kind {
            SeriesKind::Run => &mut self.runs,
            SeriesKind::Job => &mut self.jobs,
        }
    }
}

fn holds(map: &HashMap<SeriesId, Written>, labels: &[String]) -> bool {
    map.values().any(|w| w.labels == labels)
}

/// Reconciles runs and jobs of every known repository into gauges.
///
/// Each run and job owns exactly one series. When its labels change (a run
/// moving from `in_progress` to `completed`, say) the superseded series is
/// removed in the same write.
pub struct WorkflowCollector {
    ctx: Arc<ExporterContext>,
    written: Mutex<WrittenSeries>,
}

impl WorkflowCollector {
    pub fn new(ctx: Arc<ExporterContext>) -> Self {
        Self {
            ctx,
            written: Mutex::new(WrittenSeries::default()),
        }
    }

    /// Run one reconciliation pass over the current repository snapshot.
    pub async fn reconcile(&self) -> CycleStats {
        let mut stats = CycleStats::default();
        let repos = self.ctx.repositories().snapshot();
        let since = self.ctx.clock().now() - self.ctx.settings().run_window;
        let api = self.ctx.api();

        for repo in repos.iter() {
            if self.ctx.shutdown().is_stopped() {
                break;
            }
            stats.repositories += 1;

            let target = repo.full_name();
            let runs = self
                .ctx
                .fetcher()
                .fetch_all("list_workflow_runs", &target, move |page| {
                    api.list_workflow_runs(repo, since, page)
                })
                .await;

            for run in &runs {
                self.reconcile_run(repo, run, &mut stats).await;
            }
        }

        stats.series_pruned = self.prune();
        stats
    }

    async fn reconcile_run(&self, repo: &RepoRef, run: &WorkflowRun, stats: &mut CycleStats) {
        stats.runs_seen += 1;
        let dedup = self.ctx.dedup();

        let key = run_key(repo, run);
        if let Some(key) = &key
            && dedup.seen(key)
        {
            stats.runs_cached += 1;
            return;
        }

        let metrics = self.ctx.metrics();
        let labels = metrics.run_label_values(repo, run);
        let duration_ms = self.run_duration_ms(repo, run).await;
        metrics.set_run(&labels, run_status_code(run.conclusion.as_deref()), duration_ms);
        let id = match run.id {
            Some(run_id) => SeriesId::Run {
                repo: repo.full_name(),
                run_id,
            },
            None => SeriesId::Labels(labels.clone()),
        };
        if self.touch(SeriesKind::Run, id, labels) {
            stats.series_replaced += 1;
        }
        stats.runs_written += 1;

        let jobs_complete = match run.id {
            Some(run_id) => self.reconcile_jobs(repo, run, run_id, stats).await,
            None => true,
        };

        // A run is only settled once all of its jobs were listed; otherwise
        // the next cycle reprocesses it and fetches the jobs again.
        match key {
            Some(key) if jobs_complete => dedup.remember(&key, self.ctx.settings().dedup_ttl),
            Some(_) => tracing::debug!(
                repo = %repo,
                run_id = run.id.unwrap_or_default(),
                "Job listing incomplete, run stays uncached"
            ),
            None => {}
        }
    }

    /// Write the jobs of one run. Returns whether every job page was fetched.
    async fn reconcile_jobs(
        &self,
        repo: &RepoRef,
        run: &WorkflowRun,
        run_id: u64,
        stats: &mut CycleStats,
    ) -> bool {
        let api = self.ctx.api();
        let target = format!("{repo}#{run_id}");
        let jobs = self
            .ctx
            .fetcher()
            .fetch_pages("list_workflow_jobs", &target, move |page| {
                api.list_workflow_jobs(repo, run_id, page)
            })
            .await;

        let dedup = self.ctx.dedup();
        let metrics = self.ctx.metrics();

        for job in &jobs.items {
            stats.jobs_seen += 1;

            let key = job_key(repo, run, job);
            if let Some(key) = &key
                && dedup.seen(key)
            {
                stats.jobs_cached += 1;
                continue;
            }

            let labels = job_label_values(repo, run, job).to_vec();
            if job.is_completed() {
                metrics.set_job_duration(&labels, job.duration_ms() as f64);
            }
            metrics.set_job_status(&labels, job_status_code(job.conclusion.as_deref()));
            let id = match job.id {
                Some(job_id) => SeriesId::Job {
                    repo: repo.full_name(),
                    run_id,
                    job_id,
                },
                None => SeriesId::Labels(labels.clone()),
            };
            if self.touch(SeriesKind::Job, id, labels) {
                stats.series_replaced += 1;
            }
            stats.jobs_written += 1;

            if let Some(key) = key {
                dedup.remember(&key, self.ctx.settings().dedup_ttl);
            }
        }

        jobs.complete
    }

    /// Billed duration when enabled and available, else wall time between
    /// creation and last update, truncated to whole seconds.
    async fn run_duration_ms(&self, repo: &RepoRef, run: &WorkflowRun) -> f64 {
        if self.ctx.settings().fetch_run_usage
            && let Some(run_id) = run.id
        {
            let api = self.ctx.api();
            let target = format!("{repo}#{run_id}");
            let billed = self
                .ctx
                .fetcher()
                .fetch_one("get_run_usage", &target, move || api.get_run_usage(repo, run_id))
                .await
                .and_then(|usage| usage.run_duration_ms);
            if let Some(ms) = billed {
                return ms as f64;
            }
        }

        (run.elapsed_seconds() * 1000) as f64
    }

    fn remove(&self, kind: SeriesKind, labels: &[String]) {
        let metrics = self.ctx.metrics();
        match kind {
            SeriesKind::Run => metrics.remove_run(labels),
            SeriesKind::Job => metrics.remove_job(labels),
        }
    }

    /// Record `labels` as the current series of `id`. Returns true when an
    /// older label set of the same object was removed.
    fn touch(&self, kind: SeriesKind, id: SeriesId, labels: Vec<String>) -> bool {
        let now = self.ctx.clock().now();
        let mut written = self.written.lock().unwrap_or_else(|e| e.into_inner());
        let map = written.of(kind);

        let previous = map.insert(id, Written { labels: labels.clone(), at: now });
        match previous {
            Some(prev) if prev.labels != labels => {
                // Another object may still own an identical label set.
                if !holds(map, &prev.labels) {
                    self.remove(kind, &prev.labels);
                }
                true
            }
            _ => false,
        }
    }

    /// Remove series that have not been rewritten for a full window plus
    /// dedup lifetime. By then the run has left the fetch window and its
    /// dedup entry has expired, so it can never be written again.
    fn prune(&self) -> usize {
        let settings = self.ctx.settings();
        let cutoff = self.ctx.clock().now() - settings.run_window - settings.dedup_ttl;
        let mut written = self.written.lock().unwrap_or_else(|e| e.into_inner());
        let mut pruned = 0;

        for kind in [SeriesKind::Run, SeriesKind::Job] {
            let map = written.of(kind);
            let mut expired = HashSet::new();
            map.retain(|_, w| {
                if w.at >= cutoff {
                    return true;
                }
                expired.insert(std::mem::take(&mut w.labels));
                false
            });
            for labels in expired {
                if !holds(map, &labels) {
                    self.remove(kind, &labels);
                    pruned += 1;
                }
            }
        }

        pruned
    }
}

#[async_trait]
impl Collector for WorkflowCollector {
    fn name(&self) -> &'static str {
        "workflows"
    }

    fn interval(&self) -> Duration {
        self.ctx.settings().refresh
    }

    async fn collect(&self) {
        let stats = self.reconcile().await;
        tracing::info!(
            repositories = stats.repositories,
            runs = stats.runs_seen,
            runs_written = stats.runs_written,
            runs_cached = stats.runs_cached,
            jobs = stats.jobs_seen,
            jobs_written = stats.jobs_written,
            jobs_cached = stats.jobs_cached,
            replaced = stats.series_replaced,
            pruned = stats.series_pruned,
            "Workflow cycle complete"
        );
    }
}
