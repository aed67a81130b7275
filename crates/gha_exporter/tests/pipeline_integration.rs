//! End-to-end tests of the fetch-cache-reconcile pipeline.
//!
//! Every scenario drives real collectors against a scripted GitHub and reads
//! the result back from the Prometheus exposition text. Each test is bounded
//! by a timeout so a stuck loop fails instead of hanging the suite.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedGitHub, completed_run, context, runner, series};
use gha_exporter::collectors::{
    Collector, RepositoryDiscovery, RunnerCollector, RunnerScope, WorkflowCollector,
    collect_once, default_collectors, run_collector,
};
use gha_exporter::github::types::{Repository, WorkflowJob};
use gha_exporter::{ExporterSettings, RepoRef, Shutdown};

/// Maximum time any scenario should take.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn org_settings() -> ExporterSettings {
    ExporterSettings {
        organizations: vec!["octo".to_string()],
        fetch_run_usage: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn terminal_run_is_written_once_and_rewritten_on_new_conclusion() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let api = Arc::new(ScriptedGitHub::default());
        let repo = RepoRef::new("octo", "hello");
        api.set_runs(&repo, vec![completed_run("success")]);

        let (_, ctx) = context(api.clone(), org_settings());
        ctx.repositories().replace(vec![repo.clone()]);
        let workflows = WorkflowCollector::new(ctx.clone());

        let first = workflows.reconcile().await;
        let second = workflows.reconcile().await;
        assert_eq!(first.runs_written, 1);
        assert_eq!(second.runs_written, 0);
        assert_eq!(second.runs_cached, 1);
        assert_eq!(api.count("list_workflow_jobs"), 1);

        api.set_runs(&repo, vec![completed_run("failure")]);
        let third = workflows.reconcile().await;
        assert_eq!(third.runs_written, 1);

        let text = ctx.metrics().encode().unwrap();
        let statuses = series(&text, "github_workflow_run_status");
        // Labels do not include the conclusion, so the series is overwritten.
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].ends_with(" 5"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn job_gauges_follow_completed_jobs() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let api = Arc::new(ScriptedGitHub::default());
        let repo = RepoRef::new("octo", "hello");
        api.set_runs(&repo, vec![completed_run("failure")]);
        let start = common::start();
        api.jobs.lock().unwrap().insert(
            100,
            vec![
                WorkflowJob {
                    id: Some(1),
                    name: Some("build".to_string()),
                    status: Some("completed".to_string()),
                    conclusion: Some("success".to_string()),
                    started_at: Some(start - chrono::Duration::seconds(90)),
                    completed_at: Some(start - chrono::Duration::seconds(30)),
                    labels: vec!["self-hosted".to_string(), "linux".to_string()],
                    runner_group_name: Some("Default".to_string()),
                    ..Default::default()
                },
                WorkflowJob {
                    id: Some(2),
                    name: Some("test".to_string()),
                    status: Some("completed".to_string()),
                    conclusion: Some("failure".to_string()),
                    // Runner clock skew: completion stamped before start.
                    started_at: Some(start - chrono::Duration::seconds(10)),
                    completed_at: Some(start - chrono::Duration::seconds(20)),
                    ..Default::default()
                },
            ],
        );

        let (_, ctx) = context(api, org_settings());
        ctx.repositories().replace(vec![repo]);
        WorkflowCollector::new(ctx.clone()).reconcile().await;

        let text = ctx.metrics().encode().unwrap();
        let durations = series(&text, "github_workflow_job_duration_total_ms");
        assert_eq!(durations.len(), 2);
        assert!(durations.iter().any(|l| l.contains("job_name=\"build\"")
            && l.contains("runner_labels=\"self-hosted,linux\"")
            && l.ends_with(" 60000")));
        assert!(durations.iter().any(|l| l.contains("job_name=\"test\"") && l.ends_with(" 0")));

        let statuses = series(&text, "github_workflow_job_status_count");
        assert!(statuses.iter().any(|l| l.contains("job_id=\"1\"") && l.ends_with(" 1")));
        assert!(statuses.iter().any(|l| l.contains("job_id=\"2\"") && l.ends_with(" 2")));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn org_and_fleet_runners_with_same_id_are_distinct() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let api = Arc::new(ScriptedGitHub::default());
        api.org_runners
            .lock()
            .unwrap()
            .insert("octo".to_string(), vec![runner(5, "builder", true)]);
        api.enterprise_runners
            .lock()
            .unwrap()
            .insert("acme".to_string(), vec![runner(5, "builder", false)]);

        let settings = ExporterSettings {
            enterprises: vec!["acme".to_string()],
            ..org_settings()
        };
        let (_, ctx) = context(api, settings);
        RunnerCollector::new(ctx.clone(), RunnerScope::Organization)
            .refresh()
            .await;
        RunnerCollector::new(ctx.clone(), RunnerScope::Fleet)
            .refresh()
            .await;

        let text = ctx.metrics().encode().unwrap();
        let runners = series(&text, "github_runner_status");
        assert_eq!(runners.len(), 2);
        assert!(runners.iter().any(|l| l.contains("scope=\"organization\"") && l.ends_with(" 1")));
        assert!(runners.iter().any(|l| l.contains("scope=\"fleet\"") && l.ends_with(" 0")));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn vanished_runner_leaves_the_exposition() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let api = Arc::new(ScriptedGitHub::default());
        api.org_runners.lock().unwrap().insert(
            "octo".to_string(),
            vec![runner(1, "a", true), runner(2, "b", true)],
        );
        let (_, ctx) = context(api.clone(), org_settings());
        let collector = RunnerCollector::new(ctx.clone(), RunnerScope::Organization);

        collector.refresh().await;
        api.org_runners
            .lock()
            .unwrap()
            .insert("octo".to_string(), vec![runner(1, "a", true)]);
        collector.refresh().await;

        let text = ctx.metrics().encode().unwrap();
        let runners = series(&text, "github_runner_status");
        assert_eq!(runners.len(), 1);
        assert!(runners[0].contains("name=\"a\""));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn static_repositories_skip_discovery_calls() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let api = Arc::new(ScriptedGitHub::default());
        api.org_repos.lock().unwrap().insert(
            "octo".to_string(),
            vec![Repository {
                full_name: Some("octo/ignored".to_string()),
                ..Default::default()
            }],
        );
        let settings = ExporterSettings {
            repositories: vec!["octo/pinned".to_string()],
            ..org_settings()
        };
        let (_, ctx) = context(api.clone(), settings);

        RepositoryDiscovery::new(ctx.clone()).collect().await;

        assert_eq!(api.count("list_org_repos"), 0);
        assert_eq!(*ctx.repositories().snapshot(), [RepoRef::new("octo", "pinned")]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn one_shot_pass_discovers_then_reconciles() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let api = Arc::new(ScriptedGitHub::default());
        *api.remaining.lock().unwrap() = 4999;
        api.org_repos.lock().unwrap().insert(
            "octo".to_string(),
            vec![Repository {
                full_name: Some("octo/hello".to_string()),
                ..Default::default()
            }],
        );
        api.set_runs(&RepoRef::new("octo", "hello"), vec![completed_run("success")]);

        let (_, ctx) = context(api.clone(), org_settings());
        collect_once(&default_collectors(&ctx)).await;

        let text = ctx.metrics().encode().unwrap();
        assert_eq!(series(&text, "github_workflow_run_status").len(), 1);
        assert!(text.contains("github_rate_limit_remaining 4999"));
        assert_eq!(
            api.calls()[..2],
            ["list_org_repos".to_string(), "list_workflow_runs".to_string()]
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test(start_paused = true)]
async fn collector_loops_stop_on_shutdown() {
    let api = Arc::new(ScriptedGitHub::default());
    let (_, ctx) = context(api.clone(), org_settings());
    let (trigger, shutdown) = Shutdown::new();

    let collector: Arc<dyn Collector> = Arc::new(WorkflowCollector::new(ctx));
    let handle = tokio::spawn(run_collector(collector, shutdown));

    tokio::time::sleep(Duration::from_secs(95)).await;
    trigger.trigger();

    tokio::time::timeout(TEST_TIMEOUT, handle)
        .await
        .expect("collector did not stop")
        .unwrap();
}
