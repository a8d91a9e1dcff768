//! End-to-end pipeline runs against a scripted executor

use std::collections::HashMap;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crew::event_crew::{self, EventDetails, VenueDetails, MARKETING_REPORT_FILE, VENUE_DETAILS_FILE};
use crew::events::{event_channel, PipelineEvent};
use crew::{
    render_report, AutoApproveConfirmation, Capability, ChannelConfirmation, Confirmation,
    ConfirmationGate, ExecutionRequest, Inputs, InteractiveConfirmation, OutputSchema, Pipeline,
    PipelineError,
    PipelineRunner, RejectConfirmation, Role, RoleRegistry, RunnerConfig, Task, TaskExecutor,
    TaskState,
};

const VENUE_JSON: &str = r#"{"name": "Moscone Center", "address": "747 Howard St, San Francisco", "capacity": "2,000", "booking_status": "tentatively reserved"}"#;

/// Per-task canned answers with an artificial delay
#[derive(Clone)]
struct Script {
    delay: Duration,
    /// One entry per attempt; the last one repeats
    replies: Vec<Result<String, String>>,
}

impl Script {
    fn answer(delay_ms: u64, text: &str) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            replies: vec![Ok(text.to_string())],
        }
    }

    fn failure(delay_ms: u64, reason: &str) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            replies: vec![Err(reason.to_string())],
        }
    }

    fn attempts(replies: &[&str]) -> Self {
        Self {
            delay: Duration::from_millis(5),
            replies: replies.iter().map(|r| Ok(r.to_string())).collect(),
        }
    }
}

#[derive(Default)]
struct ScriptedExecutor {
    scripts: HashMap<usize, Script>,
    requests: Mutex<Vec<ExecutionRequest>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedExecutor {
    fn new(scripts: impl IntoIterator<Item = (usize, Script)>) -> Arc<Self> {
        Arc::new(Self {
            scripts: scripts.into_iter().collect(),
            ..Default::default()
        })
    }

    fn requests_for(&self, task_index: usize) -> Vec<ExecutionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.task_index == task_index)
            .cloned()
            .collect()
    }

    fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> crew::Result<String> {
        self.requests.lock().unwrap().push(request.clone());

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let script = self
            .scripts
            .get(&request.task_index)
            .cloned()
            .unwrap_or_else(|| Script::answer(1, "done"));
        tokio::time::sleep(script.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        let attempt = request.attempt().min(script.replies.len() - 1);
        script.replies[attempt]
            .clone()
            .map_err(|reason| PipelineError::tool("search_internet", reason))
    }
}

fn registry() -> RoleRegistry {
    RoleRegistry::new()
        .with_role(Role::new("Planner", "Plan", Capability::ALL, "").unwrap())
        .unwrap()
}

fn runner(executor: Arc<ScriptedExecutor>, gate: Arc<dyn ConfirmationGate>, dir: &Path) -> PipelineRunner {
    PipelineRunner::new(executor, gate, RunnerConfig::default().with_output_dir(dir))
}

fn auto() -> Arc<dyn ConfirmationGate> {
    Arc::new(AutoApproveConfirmation)
}

#[tokio::test]
async fn test_synchronous_tasks_run_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::assemble(
        registry(),
        vec![
            Task::new("first", "e", "Planner"),
            Task::new("second", "e", "Planner"),
            Task::new("third", "e", "Planner"),
        ],
    )
    .unwrap();
    let executor = ScriptedExecutor::new([
        (0, Script::answer(40, "one")),
        (1, Script::answer(10, "two")),
        (2, Script::answer(1, "three")),
    ]);

    let report = runner(executor.clone(), auto(), dir.path())
        .run(&pipeline, &Inputs::new())
        .await
        .unwrap();

    for pair in report.tasks.windows(2) {
        assert!(pair[0].completed_at <= pair[1].dispatched_at);
    }
    assert!(report.tasks.iter().all(|t| t.state == TaskState::Completed));
    assert_eq!(report.final_output(), Some("three"));

    // Each task sees the outputs completed before it
    assert_eq!(executor.requests_for(2)[0].context, vec!["one", "two"]);
}

#[tokio::test]
async fn test_concurrent_task_does_not_block_later_synchronous_task() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::assemble(
        registry(),
        vec![
            Task::new("slow background", "e", "Planner").concurrent(),
            Task::new("quick foreground", "e", "Planner"),
        ],
    )
    .unwrap();
    let executor = ScriptedExecutor::new([
        (0, Script::answer(300, "background")),
        (1, Script::answer(10, "foreground")),
    ]);

    let report = runner(executor.clone(), auto(), dir.path())
        .run(&pipeline, &Inputs::new())
        .await
        .unwrap();

    let background = report.task(0).unwrap();
    let foreground = report.task(1).unwrap();
    assert!(foreground.dispatched_at < background.completed_at);
    assert!(foreground.completed_at < background.completed_at);

    // The unfinished concurrent task contributes no context
    assert!(executor.requests_for(1)[0].context.is_empty());
}

#[tokio::test]
async fn test_max_concurrency_bounds_concurrent_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let tasks = (0..4)
        .map(|i| Task::new(format!("job {i}"), "e", "Planner").concurrent())
        .collect();
    let pipeline = Pipeline::assemble(registry(), tasks).unwrap();
    let executor = ScriptedExecutor::new((0..4).map(|i| (i, Script::answer(30, "ok"))));

    let mut config = RunnerConfig::default().with_output_dir(dir.path());
    config.max_concurrency = 2;
    PipelineRunner::new(executor.clone(), auto(), config)
        .run(&pipeline, &Inputs::new())
        .await
        .unwrap();

    assert_eq!(executor.call_count(), 4);
    assert!(executor.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_saturated_pool_starts_tasks_in_declared_order() {
    let dir = tempfile::tempdir().unwrap();
    let tasks = (0..6)
        .map(|i| Task::new(format!("job {i}"), "e", "Planner").concurrent())
        .collect();
    let pipeline = Pipeline::assemble(registry(), tasks).unwrap();
    let executor = ScriptedExecutor::new((0..6).map(|i| (i, Script::answer(5, "ok"))));

    let mut config = RunnerConfig::default().with_output_dir(dir.path());
    config.max_concurrency = 1;
    PipelineRunner::new(executor.clone(), auto(), config)
        .run(&pipeline, &Inputs::new())
        .await
        .unwrap();

    let started: Vec<usize> = executor
        .requests
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.task_index)
        .collect();
    assert_eq!(started, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(executor.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_placeholder_fails_before_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = event_crew::pipeline().unwrap();
    let mut inputs = EventDetails::default().into_inputs();
    inputs.remove("tentative_date");

    let executor = ScriptedExecutor::new(Vec::new());
    let err = runner(executor.clone(), auto(), dir.path())
        .run(&pipeline, &inputs)
        .await
        .unwrap_err();

    match err {
        PipelineError::MissingPlaceholder { task_index, placeholder } => {
            assert_eq!(task_index, 1);
            assert_eq!(placeholder, "tentative_date");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(executor.call_count(), 0);
}

#[tokio::test]
async fn test_schema_violation_writes_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::assemble(
        registry(),
        vec![Task::new("Find a venue", "venue", "Planner")
            .with_output_schema(OutputSchema::of::<VenueDetails>())
            .with_output_file(VENUE_DETAILS_FILE)],
    )
    .unwrap();
    let executor = ScriptedExecutor::new([(0, Script::answer(1, r#"{"name": "Pier 27"}"#))]);

    let err = runner(executor, auto(), dir.path())
        .run(&pipeline, &Inputs::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::SchemaValidation { task_index: 0, .. }));
    assert!(!dir.path().join(VENUE_DETAILS_FILE).exists());
}

#[tokio::test]
async fn test_event_crew_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = event_crew::pipeline().unwrap();
    let executor = ScriptedExecutor::new([
        (0, Script::answer(10, &format!("Here is the venue:\n```json\n{VENUE_JSON}\n```"))),
        (1, Script::answer(20, "Catering for 500 confirmed.")),
        (2, Script::answer(20, "# Marketing Report\n\n- Launched campaign")),
    ]);

    let report = runner(executor.clone(), auto(), dir.path())
        .run(&pipeline, &EventDetails::default().into_inputs())
        .await
        .unwrap();

    assert_eq!(
        executor.requests_for(0)[0].description,
        "Find a venue in San Francisco that meets criteria for Tech Innovation Conference."
    );

    let written = std::fs::read_to_string(dir.path().join(VENUE_DETAILS_FILE)).unwrap();
    let venue: serde_json::Value = serde_json::from_str(&written).unwrap();
    let mut keys: Vec<_> = venue.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["address", "booking_status", "capacity", "name"]);
    assert_eq!(venue["capacity"], 2000);

    assert_eq!(report.artifacts().len(), 2);
    assert_eq!(
        report.task(0).unwrap().output.structured.as_ref().unwrap()["name"],
        "Moscone Center"
    );

    let sections = render_report(dir.path(), &event_crew::artifacts()).await.unwrap();
    assert!(sections.contains("=== Venue Details ===\n{\n  \"name\": \"Moscone Center\""));
    assert!(sections.contains("=== Marketing Report ===\n# Marketing Report"));
}

#[tokio::test]
async fn test_missing_artifact_reported_while_other_is_shown() {
    let dir = tempfile::tempdir().unwrap();
    let executor = ScriptedExecutor::new([(0, Script::answer(1, VENUE_JSON))]);

    runner(executor, auto(), dir.path())
        .run(&event_crew::pipeline().unwrap(), &EventDetails::default().into_inputs())
        .await
        .unwrap();
    std::fs::remove_file(dir.path().join(MARKETING_REPORT_FILE)).unwrap();

    let sections = render_report(dir.path(), &event_crew::artifacts()).await.unwrap();
    assert!(sections.contains("\"booking_status\": \"tentatively reserved\""));
    assert!(sections.contains("marketing_report.md not found yet"));
}

#[tokio::test]
async fn test_channel_confirmation_revise_then_approve() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::assemble(
        registry(),
        vec![Task::new("Find a venue", "venue", "Planner")
            .with_human_confirmation()
            .with_output_schema(OutputSchema::of::<VenueDetails>())
            .with_output_file(VENUE_DETAILS_FILE)],
    )
    .unwrap();
    let cheaper = VENUE_JSON.replace("Moscone Center", "Fort Mason");
    let executor = ScriptedExecutor::new([(0, Script::attempts(&[VENUE_JSON, cheaper.as_str()]))]);

    let (gate, mut inbox) = ChannelConfirmation::new();
    let (events_tx, mut events_rx) = event_channel();
    let runner = runner(executor.clone(), Arc::new(gate.clone()), dir.path()).with_event_sender(events_tx);
    let venue_file = dir.path().join(VENUE_DETAILS_FILE);

    let responder = async {
        let first = inbox.recv().await.unwrap();
        assert_eq!(first.id, "task-0-attempt-0");
        assert!(first.output.contains("Moscone Center"));

        // Suspended: nothing completes until a signal arrives
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gate.is_pending(&first.id));
        assert!(!venue_file.exists());
        gate.submit(&first.id, Confirmation::Revise("Something cheaper".to_string()))
            .unwrap();

        let second = inbox.recv().await.unwrap();
        assert_eq!(second.id, "task-0-attempt-1");
        gate.submit(&second.id, Confirmation::Approved).unwrap();
    };

    let inputs = Inputs::new();
    let (report, ()) = tokio::join!(runner.run(&pipeline, &inputs), responder);
    let report = report.unwrap();

    assert_eq!(report.task(0).unwrap().revisions, 1);
    assert_eq!(report.total_revisions(), 1);
    assert!(std::fs::read_to_string(&venue_file).unwrap().contains("Fort Mason"));

    let retry = &executor.requests_for(0)[1];
    assert_eq!(retry.revisions[0].feedback, "Something cheaper");
    assert!(retry.revisions[0].previous_output.contains("Moscone Center"));

    drop(runner);
    let mut saw_revision = false;
    while let Some(event) = events_rx.recv().await {
        if let PipelineEvent::TaskRevised { revision, .. } = event {
            assert_eq!(revision, 1);
            saw_revision = true;
        }
    }
    assert!(saw_revision);
}

#[tokio::test]
async fn test_revision_limit_accepts_last_answer() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::assemble(
        registry(),
        vec![Task::new("Plan", "plan", "Planner").with_human_confirmation()],
    )
    .unwrap();
    let executor = ScriptedExecutor::new([(0, Script::attempts(&["v1", "v2", "v3"]))]);

    let (gate, mut inbox) = ChannelConfirmation::new();
    let mut config = RunnerConfig::default().with_output_dir(dir.path());
    config.max_revisions = 2;
    let runner = PipelineRunner::new(executor.clone(), Arc::new(gate.clone()), config);

    let responder = async {
        while let Some(request) = inbox.recv().await {
            let _ = gate.submit(&request.id, Confirmation::Revise("again".to_string()));
        }
    };

    let inputs = Inputs::new();
    let report = tokio::select! {
        report = runner.run(&pipeline, &inputs) => report.unwrap(),
        _ = responder => panic!("inbox closed before the run finished"),
    };

    assert_eq!(executor.call_count(), 3);
    assert_eq!(report.task(0).unwrap().revisions, 2);
    assert_eq!(report.final_output(), Some("v3"));
}

#[tokio::test]
async fn test_rejection_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = event_crew::pipeline().unwrap();
    let executor = ScriptedExecutor::new([(0, Script::answer(1, VENUE_JSON))]);

    let err = runner(executor.clone(), Arc::new(RejectConfirmation), dir.path())
        .run(&pipeline, &EventDetails::default().into_inputs())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ConfirmationRejected { task_index: 0, .. }));
    assert!(!dir.path().join(VENUE_DETAILS_FILE).exists());
    // Later tasks were never dispatched
    assert_eq!(executor.call_count(), 1);
}

#[tokio::test]
async fn test_concurrent_failure_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::assemble(
        registry(),
        vec![
            Task::new("fails fast", "e", "Planner").concurrent(),
            Task::new("takes forever", "e", "Planner"),
        ],
    )
    .unwrap();
    let executor = ScriptedExecutor::new([
        (0, Script::failure(10, "search backend unavailable")),
        (1, Script::answer(10_000, "too late")),
    ]);

    let start = Instant::now();
    let err = runner(executor, auto(), dir.path())
        .run(&pipeline, &Inputs::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ToolInvocation { .. }));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_suspended_task_does_not_block_other_concurrent_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::assemble(
        registry(),
        vec![
            Task::new("needs sign-off", "e", "Planner")
                .concurrent()
                .with_human_confirmation(),
            Task::new("write the report", "e", "Planner")
                .concurrent()
                .with_output_file("b.md"),
        ],
    )
    .unwrap();
    let executor = ScriptedExecutor::new([
        (0, Script::answer(1, "draft")),
        (1, Script::answer(30, "# Report")),
    ]);

    let (gate, mut inbox) = ChannelConfirmation::new();
    let runner = runner(executor, Arc::new(gate.clone()), dir.path());
    let report_file = dir.path().join("b.md");

    let responder = async {
        let pending = inbox.recv().await.unwrap();
        assert_eq!(pending.task_index, 0);

        for _ in 0..200 {
            if report_file.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(report_file.exists(), "second task must finish while the first is suspended");
        assert!(gate.is_pending(&pending.id));

        gate.submit(&pending.id, Confirmation::Approved).unwrap();
    };

    let inputs = Inputs::new();
    let (report, ()) = tokio::join!(runner.run(&pipeline, &inputs), responder);
    let report = report.unwrap();

    let suspended = report.task(0).unwrap();
    let background = report.task(1).unwrap();
    assert!(background.completed_at < suspended.completed_at);
}

/// Input that never delivers a line while the sender is alive
struct HeldInput(std::sync::mpsc::Receiver<()>);

impl Read for HeldInput {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        let _ = self.0.recv();
        Ok(0)
    }
}

#[test]
fn test_failure_during_console_prompt_releases_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let (_release, held) = std::sync::mpsc::channel::<()>();
    let gate = InteractiveConfirmation::with_reader(BufReader::new(HeldInput(held))).unwrap();

    let pipeline = Pipeline::assemble(
        registry(),
        vec![
            Task::new("waits at the prompt", "e", "Planner")
                .concurrent()
                .with_human_confirmation(),
            Task::new("fails", "e", "Planner").concurrent(),
        ],
    )
    .unwrap();
    let executor = ScriptedExecutor::new([
        (0, Script::answer(1, "draft")),
        (1, Script::failure(50, "search backend unavailable")),
    ]);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let inputs = Inputs::new();
    let err = runtime
        .block_on(runner(executor, Arc::new(gate), dir.path()).run(&pipeline, &inputs))
        .unwrap_err();
    assert!(matches!(err, PipelineError::ToolInvocation { .. }));

    // Nobody answered the prompt; shutting down must not wait for input
    let start = Instant::now();
    drop(runtime);
    assert!(start.elapsed() < Duration::from_secs(2));
}
