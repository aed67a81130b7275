//! GitHub REST API data types.
//!
//! Every field the exporter reads is optional or defaulted: the API omits
//! fields freely (enterprise servers lag behind github.com) and a missing
//! value must never take down a poll cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::RepoRef;

/// A single rate limit resource entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitResource {
    /// Maximum requests allowed per period.
    #[serde(default)]
    pub limit: u64,
    /// Requests used in current period.
    #[serde(default)]
    pub used: u64,
    /// Remaining requests in current period.
    #[serde(default)]
    pub remaining: u64,
    /// Unix timestamp when the rate limit resets.
    #[serde(default)]
    pub reset: i64,
}

impl RateLimitResource {
    /// Get the reset time as a DateTime.
    pub fn reset_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.reset, 0).unwrap_or_else(Utc::now)
    }
}

/// Rate limit resources the exporter cares about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitResources {
    /// Core API rate limit (non-search REST endpoints).
    pub core: RateLimitResource,
    /// Search API rate limit.
    #[serde(default)]
    pub search: Option<RateLimitResource>,
    /// GraphQL API rate limit.
    #[serde(default)]
    pub graphql: Option<RateLimitResource>,
    /// Actions runner registration rate limit.
    #[serde(default)]
    pub actions_runner_registration: Option<RateLimitResource>,
}

/// Response of `GET /rate_limit`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitResponse {
    pub resources: RateLimitResources,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Owner {
    #[serde(default)]
    pub login: Option<String>,
}

/// A repository as listed by `GET /orgs/{org}/repos`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub owner: Option<Owner>,
    #[serde(default)]
    pub archived: bool,
}

impl Repository {
    /// The `owner/name` reference, from `full_name` or `owner.login` + `name`.
    pub fn repo_ref(&self) -> Option<RepoRef> {
        if let Some(parsed) = self.full_name.as_deref().and_then(RepoRef::parse) {
            return Some(parsed);
        }
        let owner = self.owner.as_ref()?.login.as_deref()?;
        let name = self.name.as_deref()?;
        Some(RepoRef::new(owner, name))
    }
}

/// One workflow run from `GET /repos/{owner}/{repo}/actions/runs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowRun {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub node_id: Option<String>,
    /// Workflow name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub head_branch: Option<String>,
    #[serde(default)]
    pub head_sha: Option<String>,
    #[serde(default)]
    pub run_number: Option<u64>,
    #[serde(default)]
    pub workflow_id: Option<u64>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// A run is terminal once GitHub has assigned it a conclusion.
    pub fn is_terminal(&self) -> bool {
        self.conclusion.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// `updated_at - created_at` in whole seconds, clamped at zero.
    pub fn elapsed_seconds(&self) -> i64 {
        match (self.created_at, self.updated_at) {
            (Some(created), Some(updated)) => (updated - created).num_seconds().max(0),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowRunList {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub workflow_runs: Vec<WorkflowRun>,
}

/// One job from `GET /repos/{owner}/{repo}/actions/runs/{run_id}/jobs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowJob {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub run_id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub runner_name: Option<String>,
    #[serde(default)]
    pub runner_group_name: Option<String>,
}

impl WorkflowJob {
    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some("completed")
    }

    /// `completed_at - started_at` in milliseconds, never negative.
    ///
    /// Runner clocks drift; a completion stamped before the start counts as 0.
    pub fn duration_ms(&self) -> i64 {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => (completed - started).num_milliseconds().max(0),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowJobList {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub jobs: Vec<WorkflowJob>,
}

/// Billed usage from `GET /repos/{owner}/{repo}/actions/runs/{run_id}/timing`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunUsage {
    #[serde(default)]
    pub run_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerLabel {
    #[serde(default)]
    pub name: Option<String>,
}

/// A self-hosted runner from an organization or enterprise inventory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Runner {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub busy: bool,
    #[serde(default)]
    pub labels: Vec<RunnerLabel>,
}

impl Runner {
    pub fn is_online(&self) -> bool {
        self.status.as_deref() == Some("online")
    }

    pub fn label_names(&self) -> Vec<&str> {
        self.labels
            .iter()
            .filter_map(|l| l.name.as_deref())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerList {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub runners: Vec<Runner>,
}

/// Terminal outcome of a run or job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conclusion {
    Success,
    Failure,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
    Neutral,
    Stale,
}

impl Conclusion {
    pub const ALL: [Conclusion; 8] = [
        Conclusion::Success,
        Conclusion::Failure,
        Conclusion::Cancelled,
        Conclusion::Skipped,
        Conclusion::TimedOut,
        Conclusion::ActionRequired,
        Conclusion::Neutral,
        Conclusion::Stale,
    ];

    /// Parse an API conclusion string. In-progress states and unknowns are `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "cancelled" => Some(Self::Cancelled),
            "skipped" => Some(Self::Skipped),
            "timed_out" => Some(Self::TimedOut),
            "action_required" => Some(Self::ActionRequired),
            "neutral" => Some(Self::Neutral),
            "stale" => Some(Self::Stale),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
            Self::TimedOut => "timed_out",
            Self::ActionRequired => "action_required",
            Self::Neutral => "neutral",
            Self::Stale => "stale",
        }
    }

    /// Value exported by the workflow run status gauge.
    pub fn run_code(self) -> f64 {
        match self {
            Self::Success => 1.0,
            Self::Skipped => 2.0,
            Self::ActionRequired => 3.0,
            Self::Cancelled => 4.0,
            Self::Failure => 5.0,
            Self::Neutral => 6.0,
            Self::Stale => 7.0,
            Self::TimedOut => 8.0,
        }
    }

    /// Value exported by the workflow job status gauge.
    ///
    /// Jobs are never `stale`, so that conclusion shares the unknown code.
    pub fn job_code(self) -> f64 {
        match self {
            Self::Success => 1.0,
            Self::Failure => 2.0,
            Self::Cancelled => 3.0,
            Self::Skipped => 4.0,
            Self::TimedOut => 5.0,
            Self::ActionRequired => 6.0,
            Self::Neutral => 7.0,
            Self::Stale => 0.0,
        }
    }
}

/// Run status gauge value for an optional conclusion string; unknown is 0.
pub fn run_status_code(conclusion: Option<&str>) -> f64 {
    conclusion
        .and_then(Conclusion::parse)
        .map_or(0.0, Conclusion::run_code)
}

/// Job status gauge value for an optional conclusion string; unknown is 0.
pub fn job_status_code(conclusion: Option<&str>) -> f64 {
    conclusion
        .and_then(Conclusion::parse)
        .map_or(0.0, Conclusion::job_code)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn run_codes_are_stable_and_unique() {
        let expected = [
            ("success", 1.0),
            ("skipped", 2.0),
            ("action_required", 3.0),
            ("cancelled", 4.0),
            ("failure", 5.0),
            ("neutral", 6.0),
            ("stale", 7.0),
            ("timed_out", 8.0),
        ];
        for (name, code) in expected {
            assert_eq!(run_status_code(Some(name)), code, "{name}");
        }

        let codes: HashSet<u64> = Conclusion::ALL
            .iter()
            .map(|c| c.run_code() as u64)
            .collect();
        assert_eq!(codes.len(), Conclusion::ALL.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn job_codes_are_stable_and_unique() {
        let expected = [
            ("success", 1.0),
            ("failure", 2.0),
            ("cancelled", 3.0),
            ("skipped", 4.0),
            ("timed_out", 5.0),
            ("action_required", 6.0),
            ("neutral", 7.0),
        ];
        for (name, code) in expected {
            assert_eq!(job_status_code(Some(name)), code, "{name}");
        }

        let codes: HashSet<u64> = expected.iter().map(|(_, c)| *c as u64).collect();
        assert_eq!(codes.len(), expected.len());
    }

    #[test]
    fn unknown_conclusions_map_to_zero() {
        for value in [None, Some(""), Some("in_progress"), Some("queued"), Some("SUCCESS")] {
            assert_eq!(run_status_code(value), 0.0);
            assert_eq!(job_status_code(value), 0.0);
        }
    }

    #[test]
    fn conclusion_round_trips_through_str() {
        for c in Conclusion::ALL {
            assert_eq!(Conclusion::parse(c.as_str()), Some(c));
        }
    }

    #[test]
    fn job_duration_is_clamped_for_clock_skew() {
        let started = DateTime::from_timestamp(1_700_000_100, 0);
        let completed = DateTime::from_timestamp(1_700_000_000, 0);
        let job = WorkflowJob {
            status: Some("completed".to_string()),
            started_at: started,
            completed_at: completed,
            ..Default::default()
        };
        assert_eq!(job.duration_ms(), 0);
    }

    #[test]
    fn job_duration_in_milliseconds() {
        let job = WorkflowJob {
            started_at: DateTime::from_timestamp(1_700_000_000, 0),
            completed_at: DateTime::from_timestamp(1_700_000_042, 0),
            ..Default::default()
        };
        assert_eq!(job.duration_ms(), 42_000);
    }

    #[test]
    fn job_duration_with_missing_timestamps_is_zero() {
        let job = WorkflowJob {
            started_at: DateTime::from_timestamp(1_700_000_000, 0),
            ..Default::default()
        };
        assert_eq!(job.duration_ms(), 0);
    }

    #[test]
    fn run_elapsed_seconds() {
        let run = WorkflowRun {
            created_at: DateTime::from_timestamp(1_700_000_000, 0),
            updated_at: DateTime::from_timestamp(1_700_000_090, 0),
            ..Default::default()
        };
        assert_eq!(run.elapsed_seconds(), 90);
        assert_eq!(WorkflowRun::default().elapsed_seconds(), 0);
    }

    #[test]
    fn run_is_terminal_only_with_conclusion() {
        let mut run = WorkflowRun {
            status: Some("in_progress".to_string()),
            ..Default::default()
        };
        assert!(!run.is_terminal());
        run.conclusion = Some(String::new());
        assert!(!run.is_terminal());
        run.conclusion = Some("success".to_string());
        assert!(run.is_terminal());
    }

    #[test]
    fn deserializes_run_with_missing_and_null_fields() {
        let run: WorkflowRun = serde_json::from_value(serde_json::json!({
            "id": 10,
            "head_branch": null,
            "status": "queued",
            "conclusion": null,
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(run.id, Some(10));
        assert!(run.head_branch.is_none());
        assert!(run.conclusion.is_none());
        assert!(run.updated_at.is_none());
    }

    #[test]
    fn runner_label_names_skip_missing() {
        let runner: Runner = serde_json::from_value(serde_json::json!({
            "id": 5,
            "name": "r1",
            "os": "linux",
            "status": "online",
            "busy": true,
            "labels": [{"name": "self-hosted"}, {"id": 3}, {"name": "x64"}]
        }))
        .unwrap();
        assert!(runner.is_online());
        assert_eq!(runner.label_names(), vec!["self-hosted", "x64"]);
    }

    #[test]
    fn repository_ref_prefers_full_name() {
        let repo = Repository {
            full_name: Some("octo/hello".to_string()),
            name: Some("other".to_string()),
            ..Default::default()
        };
        assert_eq!(repo.repo_ref(), Some(RepoRef::new("octo", "hello")));

        let repo = Repository {
            name: Some("hello".to_string()),
            owner: Some(Owner {
                login: Some("octo".to_string()),
            }),
            ..Default::default()
        };
        assert_eq!(repo.repo_ref(), Some(RepoRef::new("octo", "hello")));
        assert_eq!(Repository::default().repo_ref(), None);
    }
}
