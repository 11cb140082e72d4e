use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use muster_core::*;
use muster_exec::{ActionOutput, ActionParams, HostAction};

// Mock implementations

/// Succeeds after a short hold, tracking how many invocations overlap
#[derive(Debug)]
struct TrackingAction {
    current: AtomicUsize,
    peak: AtomicUsize,
    hold: Duration,
}

impl TrackingAction {
    fn new(hold: Duration) -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            hold,
        }
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostAction for TrackingAction {
    async fn invoke(&self, _target: &str, _params: &ActionParams) -> ActionOutput {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        ActionOutput::ok("done")
    }

    fn name(&self) -> &str {
        "tracking"
    }
}

/// Behaves according to the target name prefix
#[derive(Debug)]
struct ScriptedAction;

#[async_trait]
impl HostAction for ScriptedAction {
    async fn invoke(&self, target: &str, _params: &ActionParams) -> ActionOutput {
        if target.starts_with("bad-") {
            ActionOutput::failed("scripted failure")
        } else if target.starts_with("boom-") {
            panic!("injected failure in action");
        } else if target.starts_with("slow-") {
            tokio::time::sleep(Duration::from_secs(600)).await;
            ActionOutput::ok("finally")
        } else {
            ActionOutput::ok("done")
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Marks listed hosts as dead, everything else reachable
struct ListProbe {
    dead: HashSet<String>,
}

impl ListProbe {
    fn new(dead: &[&str]) -> Self {
        Self {
            dead: dead.iter().map(ToString::to_string).collect(),
        }
    }
}

#[async_trait]
impl ReachabilityProbe for ListProbe {
    async fn probe(&self, target: &str) -> bool {
        !self.dead.contains(target)
    }
}

#[derive(Default)]
struct RecordingProgress {
    seen: Mutex<Vec<(usize, usize)>>,
}

impl ProgressObserver for RecordingProgress {
    fn on_progress(&self, completed: usize, total: usize) {
        self.seen.lock().unwrap().push((completed, total));
    }
}

fn targets(hosts: &[&str]) -> Vec<Target> {
    hosts.iter().copied().map(Target::new).collect()
}

fn quick_config(max_concurrent: usize) -> RunConfig {
    RunConfig {
        max_concurrent,
        per_task_timeout: Duration::from_secs(5),
        ..RunConfig::default()
    }
}

#[tokio::test]
async fn concurrency_never_exceeds_the_configured_cap() {
    let action = Arc::new(TrackingAction::new(Duration::from_millis(20)));
    let dispatcher = Dispatcher::new(
        Arc::clone(&action) as Arc<dyn HostAction>,
        Arc::new(AlwaysReachable),
        quick_config(3),
    );

    let hosts: Vec<String> = (0..16).map(|i| format!("host-{i}")).collect();
    let host_refs: Vec<&str> = hosts.iter().map(String::as_str).collect();
    let report = dispatcher.run(targets(&host_refs)).await.unwrap();

    assert!(action.peak() <= 3, "peak concurrency was {}", action.peak());
    assert_eq!(report.summary.total, 16);
    assert_eq!(report.summary.succeeded, 16);
    assert!(!report.degraded);
}

#[tokio::test]
async fn every_target_gets_exactly_one_outcome_across_failure_modes() {
    let config = RunConfig {
        max_concurrent: 4,
        per_task_timeout: Duration::from_millis(100),
        ..RunConfig::default()
    };
    let dispatcher = Dispatcher::new(
        Arc::new(ScriptedAction),
        Arc::new(ListProbe::new(&["dead-1"])),
        config,
    );

    let report = dispatcher
        .run(targets(&[
            "ok-1", "ok-2", "bad-1", "boom-1", "dead-1", "slow-1",
        ]))
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 6);
    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.panicked, 1);
    assert_eq!(report.summary.unreachable, 1);
    assert_eq!(report.summary.timed_out, 1);
    assert!(!report.degraded);

    let mut seen: Vec<&str> = report.outcomes.iter().map(|o| o.target.as_str()).collect();
    seen.sort_unstable();
    assert_eq!(seen, vec!["bad-1", "boom-1", "dead-1", "ok-1", "ok-2", "slow-1"]);

    let panicked = report
        .outcomes
        .iter()
        .find(|o| o.target == "boom-1")
        .unwrap();
    assert_eq!(panicked.status, TaskStatus::Panicked);
    assert!(!panicked.success());
}

#[tokio::test]
async fn ten_targets_three_unreachable_cap_two_completes() {
    let action = Arc::new(TrackingAction::new(Duration::from_millis(10)));
    let dispatcher = Dispatcher::new(
        Arc::clone(&action) as Arc<dyn HostAction>,
        Arc::new(ListProbe::new(&["host-2", "host-5", "host-8"])),
        quick_config(2),
    );

    let hosts: Vec<String> = (0..10).map(|i| format!("host-{i}")).collect();
    let host_refs: Vec<&str> = hosts.iter().map(String::as_str).collect();
    let report = tokio::time::timeout(
        Duration::from_secs(30),
        dispatcher.run(targets(&host_refs)),
    )
    .await
    .expect("run must not deadlock")
    .unwrap();

    assert_eq!(report.outcomes.len(), 10);
    assert_eq!(report.summary.unreachable, 3);
    assert_eq!(report.summary.succeeded, 7);
    assert!(action.peak() <= 2);
    assert!(!report.degraded);

    for outcome in &report.outcomes {
        let expected = if matches!(outcome.target.as_str(), "host-2" | "host-5" | "host-8") {
            TaskStatus::Unreachable
        } else {
            TaskStatus::Succeeded
        };
        assert_eq!(outcome.status, expected, "target {}", outcome.target);
    }
}

#[tokio::test]
async fn run_deadline_abandons_remaining_tasks_with_outcomes() {
    let config = RunConfig {
        max_concurrent: 1,
        per_task_timeout: Duration::from_secs(60),
        overall_timeout: Some(Duration::from_millis(200)),
        ..RunConfig::default()
    };
    let dispatcher = Dispatcher::new(Arc::new(ScriptedAction), Arc::new(AlwaysReachable), config);

    let started = std::time::Instant::now();
    let report = dispatcher
        .run(targets(&["slow-1", "slow-2", "slow-3", "slow-4"]))
        .await
        .unwrap();

    assert!(
        started.elapsed() < Duration::from_secs(10),
        "deadline did not cut the run short"
    );
    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.summary.timed_out, 4);
    assert!(!report.degraded);
}

#[tokio::test]
async fn progress_reaches_the_total() {
    let progress = Arc::new(RecordingProgress::default());
    let dispatcher = Dispatcher::new(
        Arc::new(TrackingAction::new(Duration::from_millis(5))) as Arc<dyn HostAction>,
        Arc::new(AlwaysReachable),
        quick_config(4),
    )
    .with_progress(Arc::clone(&progress) as Arc<dyn ProgressObserver>);

    let hosts: Vec<String> = (0..8).map(|i| format!("host-{i}")).collect();
    let host_refs: Vec<&str> = hosts.iter().map(String::as_str).collect();
    dispatcher.run(targets(&host_refs)).await.unwrap();

    let seen = progress.seen.lock().unwrap();
    assert_eq!(seen.len(), 8, "one update per completed target");
    assert!(seen.iter().all(|&(_, total)| total == 8));
    assert!(seen.iter().any(|&(completed, _)| completed == 8));
}

#[tokio::test]
async fn event_stream_covers_the_whole_run() {
    let dispatcher = Dispatcher::new(
        Arc::new(ScriptedAction),
        Arc::new(ListProbe::new(&["dead-1"])),
        quick_config(2),
    );
    let mut rx = dispatcher.subscribe();

    dispatcher
        .run(targets(&["ok-1", "ok-2", "bad-1", "dead-1"]))
        .await
        .unwrap();

    let mut started = 0;
    let mut completed = 0;
    let mut run_completed = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            RunEvent::TaskStarted { .. } => started += 1,
            RunEvent::TaskCompleted { .. } => completed += 1,
            RunEvent::RunCompleted { summary } => run_completed = Some(summary),
        }
    }

    // The dead target never starts an action but still completes
    assert_eq!(started, 3);
    assert_eq!(completed, 4);
    let summary = run_completed.expect("RunCompleted must be emitted");
    assert_eq!(summary.total, 4);
    assert_eq!(summary.unreachable, 1);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn report_file_matches_the_run() {
    let dispatcher = Dispatcher::new(
        Arc::new(ScriptedAction),
        Arc::new(AlwaysReachable),
        quick_config(4),
    );
    let report = dispatcher
        .run(targets(&["ok-1", "ok-2", "bad-1"]))
        .await
        .unwrap();

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("report.csv");
    ReportWriter::new(&path, ReportFormat::Csv)
        .write(&report)
        .await
        .unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 4, "header plus one row per target");
    assert!(lines[0].starts_with("target,action,success"));
    assert!(contents.contains("bad-1,scripted,false,scripted failure"));
}
