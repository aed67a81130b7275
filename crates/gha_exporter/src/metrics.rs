//! Gauge registry and label mapping.
//!
//! All gauges live in one [`prometheus::Registry`] owned by [`ExporterMetrics`].
//! Collectors write through the typed helpers here so that label order is
//! decided in a single place.

use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;

use crate::api::RepoRef;
use crate::github::types::{Runner, WorkflowJob, WorkflowRun};

/// Default metric name prefix.
pub const DEFAULT_NAMESPACE: &str = "github";

/// Default label set of the workflow run gauges.
pub const DEFAULT_WORKFLOW_FIELDS: &str =
    "repo,id,node_id,head_branch,head_sha,run_number,workflow_id,workflow,event,status";

/// Label names of the workflow job gauges, in value order.
pub const JOB_LABELS: [&str; 10] = [
    "org",
    "repo",
    "branch",
    "status",
    "conclusion",
    "runner_group",
    "runner_labels",
    "workflow_name",
    "job_name",
    "job_id",
];

/// Label names of the runner gauge, in value order.
pub const RUNNER_LABELS: [&str; 7] = ["scope", "owner", "os", "name", "id", "busy", "runner_labels"];

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metric registration failed: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("exposition is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A workflow run attribute that can be exported as a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunField {
    /// Repository short name.
    Repo,
    Id,
    NodeId,
    HeadBranch,
    HeadSha,
    RunNumber,
    WorkflowId,
    /// Workflow name.
    Workflow,
    Event,
    Status,
    Conclusion,
    /// A configured name with no mapping. Exported with an empty value.
    Unknown(String),
}

impl RunField {
    pub fn parse(name: &str) -> Self {
        match name {
            "repo" => Self::Repo,
            "id" => Self::Id,
            "node_id" => Self::NodeId,
            "head_branch" => Self::HeadBranch,
            "head_sha" => Self::HeadSha,
            "run_number" => Self::RunNumber,
            "workflow_id" => Self::WorkflowId,
            "workflow" => Self::Workflow,
            "event" => Self::Event,
            "status" => Self::Status,
            "conclusion" => Self::Conclusion,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The label name this field is exported under.
    pub fn label_name(&self) -> &str {
        match self {
            Self::Repo => "repo",
            Self::Id => "id",
            Self::NodeId => "node_id",
            Self::HeadBranch => "head_branch",
            Self::HeadSha => "head_sha",
            Self::RunNumber => "run_number",
            Self::WorkflowId => "workflow_id",
            Self::Workflow => "workflow",
            Self::Event => "event",
            Self::Status => "status",
            Self::Conclusion => "conclusion",
            Self::Unknown(name) => name,
        }
    }

    /// Label value for `run`. Missing attributes become "".
    pub fn value(&self, repo: &RepoRef, run: &WorkflowRun) -> String {
        fn text(v: &Option<String>) -> String {
            v.clone().unwrap_or_default()
        }
        fn number(v: Option<u64>) -> String {
            v.map(|n| n.to_string()).unwrap_or_default()
        }

        match self {
            Self::Repo => repo.name.clone(),
            Self::Id => number(run.id),
            Self::NodeId => text(&run.node_id),
            Self::HeadBranch => text(&run.head_branch),
            Self::HeadSha => text(&run.head_sha),
            Self::RunNumber => number(run.run_number),
            Self::WorkflowId => number(run.workflow_id),
            Self::Workflow => text(&run.name),
            Self::Event => text(&run.event),
            Self::Status => text(&run.status),
            Self::Conclusion => text(&run.conclusion),
            Self::Unknown(name) => {
                tracing::warn!(field = %name, "Unknown workflow field, exporting empty value");
                String::new()
            }
        }
    }
}

/// Parse a comma-separated field list. Blank entries are dropped.
pub fn parse_run_fields(list: &str) -> Vec<RunField> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(RunField::parse)
        .collect()
}

/// Join runner labels into a single label value.
pub fn join_labels<S: AsRef<str>>(labels: &[S]) -> String {
    labels
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}

/// Label values of a job series, ordered as [`JOB_LABELS`].
pub fn job_label_values(repo: &RepoRef, run: &WorkflowRun, job: &WorkflowJob) -> [String; 10] {
    [
        repo.owner.clone(),
        repo.name.clone(),
        run.head_branch.clone().unwrap_or_default(),
        job.status.clone().unwrap_or_default(),
        job.conclusion.clone().unwrap_or_default(),
        job.runner_group_name.clone().unwrap_or_default(),
        join_labels(&job.labels),
        run.name.clone().unwrap_or_default(),
        job.name.clone().unwrap_or_default(),
        job.id.map(|id| id.to_string()).unwrap_or_default(),
    ]
}

/// Label values of a runner series, ordered as [`RUNNER_LABELS`].
pub fn runner_label_values(scope: &str, owner: &str, runner: &Runner) -> [String; 7] {
    [
        scope.to_string(),
        owner.to_string(),
        runner.os.clone().unwrap_or_default(),
        runner.name.clone().unwrap_or_default(),
        runner.id.map(|id| id.to_string()).unwrap_or_default(),
        runner.busy.to_string(),
        join_labels(&runner.label_names()),
    ]
}

/// Borrow owned label values in the form `with_label_values` takes.
pub fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

/// Every gauge the exporter publishes.
pub struct ExporterMetrics {
    registry: Registry,
    run_fields: Vec<RunField>,
    pub rate_limit_remaining: Gauge,
    pub runner_status: GaugeVec,
    pub workflow_run_status: GaugeVec,
    pub workflow_run_duration_ms: GaugeVec,
    pub workflow_job_duration_total_ms: GaugeVec,
    pub workflow_job_status_count: GaugeVec,
}

impl ExporterMetrics {
    /// Build and register all gauges. Invalid or duplicate label names fail here.
    pub fn new(namespace: &str, run_fields: Vec<RunField>) -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let opts = |name: &str, help: &str| Opts::new(name, help).namespace(namespace);

        let run_label_names: Vec<&str> = run_fields.iter().map(RunField::label_name).collect();

        let rate_limit_remaining = Gauge::with_opts(opts(
            "rate_limit_remaining",
            "Remaining requests in the core API quota",
        ))?;
        let runner_status = GaugeVec::new(
            opts("runner_status", "Runner status (1 online, 0 otherwise)"),
            &RUNNER_LABELS,
        )?;
        let workflow_run_status = GaugeVec::new(
            opts(
                "workflow_run_status",
                "Workflow run conclusion (success=1 skipped=2 action_required=3 cancelled=4 failure=5 neutral=6 stale=7 timed_out=8, 0 otherwise)",
            ),
            &run_label_names,
        )?;
        let workflow_run_duration_ms = GaugeVec::new(
            opts("workflow_run_duration_ms", "Workflow run duration in milliseconds"),
            &run_label_names,
        )?;
        let workflow_job_duration_total_ms = GaugeVec::new(
            opts(
                "workflow_job_duration_total_ms",
                "Completed workflow job duration in milliseconds",
            ),
            &JOB_LABELS,
        )?;
        let workflow_job_status_count = GaugeVec::new(
            opts(
                "workflow_job_status_count",
                "Workflow job conclusion (success=1 failure=2 cancelled=3 skipped=4 timed_out=5 action_required=6 neutral=7, 0 otherwise)",
            ),
            &JOB_LABELS,
        )?;

        registry.register(Box::new(rate_limit_remaining.clone()))?;
        registry.register(Box::new(runner_status.clone()))?;
        registry.register(Box::new(workflow_run_status.clone()))?;
        registry.register(Box::new(workflow_run_duration_ms.clone()))?;
        registry.register(Box::new(workflow_job_duration_total_ms.clone()))?;
        registry.register(Box::new(workflow_job_status_count.clone()))?;

        Ok(Self {
            registry,
            run_fields,
            rate_limit_remaining,
            runner_status,
            workflow_run_status,
            workflow_run_duration_ms,
            workflow_job_duration_total_ms,
            workflow_job_status_count,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn run_fields(&self) -> &[RunField] {
        &self.run_fields
    }

    /// Label values of a run series, ordered as the configured fields.
    pub fn run_label_values(&self, repo: &RepoRef, run: &WorkflowRun) -> Vec<String> {
        self.run_fields.iter().map(|f| f.value(repo, run)).collect()
    }

    pub fn set_run(&self, labels: &[String], status_code: f64, duration_ms: f64) {
        let labels = as_strs(labels);
        self.workflow_run_status
            .with_label_values(&labels)
            .set(status_code);
        self.workflow_run_duration_ms
            .with_label_values(&labels)
            .set(duration_ms);
    }

    pub fn set_job_duration(&self, labels: &[String], duration_ms: f64) {
        self.workflow_job_duration_total_ms
            .with_label_values(&as_strs(labels))
            .set(duration_ms);
    }

    pub fn set_job_status(&self, labels: &[String], status_code: f64) {
        self.workflow_job_status_count
            .with_label_values(&as_strs(labels))
            .set(status_code);
    }

    pub fn set_runner(&self, labels: &[String], online: bool) {
        self.runner_status
            .with_label_values(&as_strs(labels))
            .set(if online { 1.0 } else { 0.0 });
    }

    /// Drop both run series for `labels`.
    pub fn remove_run(&self, labels: &[String]) {
        let labels = as_strs(labels);
        let _ = self.workflow_run_status.remove_label_values(&labels);
        let _ = self.workflow_run_duration_ms.remove_label_values(&labels);
    }

    /// Drop both job series for `labels`. Only completed jobs have a duration.
    pub fn remove_job(&self, labels: &[String]) {
        let labels = as_strs(labels);
        let _ = self.workflow_job_duration_total_ms.remove_label_values(&labels);
        let _ = self.workflow_job_status_count.remove_label_values(&labels);
    }

    /// Drop one runner series. Returns false if it was not present.
    pub fn remove_runner(&self, labels: &[String]) -> bool {
        self.runner_status
            .remove_label_values(&as_strs(labels))
            .is_ok()
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl std::fmt::Debug for ExporterMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExporterMetrics")
            .field("run_fields", &self.run_fields)
            .finish_non_exhaustive()
    }
}
