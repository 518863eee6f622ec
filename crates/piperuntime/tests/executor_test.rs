use async_trait::async_trait;
use futures::StreamExt;
use pipecore::config::{self, ConfigMap};
use pipecore::{
    ComponentDescriptor, GraphStore, InputSource, OutputSink, ProcessedRecord, Processor, Record,
    RecordStream, Role, Row, RunEvent, RunStatus, StageContext, StageError, StoreError,
    TaskBinding, TaskError, TaskState, Value,
};
use piperuntime::{
    CapabilityRegistry, InputFactory, OutputFactory, PipelineRuntime, ProcessorFactory,
    StartOutcome,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Input that yields `count` records, optionally pausing between them
struct TickerInput {
    count: u64,
    delay: Duration,
}

#[async_trait]
impl InputSource for TickerInput {
    fn class_name(&self) -> &str {
        "test.ticker"
    }

    async fn open(&self, _ctx: StageContext) -> Result<RecordStream, StageError> {
        let count = self.count;
        let delay = self.delay;
        let stream = futures::stream::unfold(0u64, move |i| async move {
            if i >= count {
                return None;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mut payload = std::collections::HashMap::new();
            payload.insert("text".to_string(), Value::from(format!("item {}", i)));
            Some((Ok(Record::new(i.to_string(), Value::Object(payload))), i + 1))
        });
        Ok(stream.boxed())
    }
}

struct TickerInputFactory;

impl InputFactory for TickerInputFactory {
    fn class_name(&self) -> &str {
        "test.ticker"
    }

    fn create(&self, cfg: &ConfigMap) -> Result<Arc<dyn InputSource>, StageError> {
        Ok(Arc::new(TickerInput {
            count: config::u64_or(cfg, "count", 5)?,
            delay: Duration::from_millis(config::u64_or(cfg, "delay_ms", 0)?),
        }))
    }
}

/// Input whose open always fails, to exercise the systemic-fault path
struct FailOpenInput;

#[async_trait]
impl InputSource for FailOpenInput {
    fn class_name(&self) -> &str {
        "test.fail_open"
    }

    async fn open(&self, _ctx: StageContext) -> Result<RecordStream, StageError> {
        Err(StageError::Systemic("cursor could not be opened".to_string()))
    }
}

struct FailOpenInputFactory;

impl InputFactory for FailOpenInputFactory {
    fn class_name(&self) -> &str {
        "test.fail_open"
    }

    fn create(&self, _cfg: &ConfigMap) -> Result<Arc<dyn InputSource>, StageError> {
        Ok(Arc::new(FailOpenInput))
    }
}

fn id_set(cfg: &ConfigMap, key: &str) -> HashSet<String> {
    cfg.get(key)
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Processor that fails the configured record ids and echoes the rest
struct MarkProcessor {
    fail: HashSet<String>,
}

#[async_trait]
impl Processor for MarkProcessor {
    fn class_name(&self) -> &str {
        "test.mark"
    }

    async fn process(
        &self,
        record: Record,
        _ctx: &StageContext,
    ) -> Result<ProcessedRecord, StageError> {
        if self.fail.contains(&record.id) {
            return Err(StageError::Record(format!("record {} rejected", record.id)));
        }
        Ok(ProcessedRecord::new(
            record.id.clone(),
            Value::from(format!("processed {}", record.id)),
        ))
    }
}

struct MarkProcessorFactory;

impl ProcessorFactory for MarkProcessorFactory {
    fn class_name(&self) -> &str {
        "test.mark"
    }

    fn create(&self, cfg: &ConfigMap) -> Result<Arc<dyn Processor>, StageError> {
        Ok(Arc::new(MarkProcessor {
            fail: id_set(cfg, "fail"),
        }))
    }
}

/// Output collecting written record ids, with configurable failures
struct CollectOutput {
    written: Arc<Mutex<Vec<String>>>,
    fail: HashSet<String>,
    systemic: Option<String>,
}

#[async_trait]
impl OutputSink for CollectOutput {
    fn class_name(&self) -> &str {
        "test.collect"
    }

    async fn write(&self, record: ProcessedRecord, _ctx: &StageContext) -> Result<(), StageError> {
        if self.systemic.as_deref() == Some(record.id.as_str()) {
            return Err(StageError::Systemic("sink connection lost".to_string()));
        }
        if self.fail.contains(&record.id) {
            return Err(StageError::Record(format!("write of {} refused", record.id)));
        }
        self.written.lock().unwrap().push(record.id);
        Ok(())
    }
}

struct CollectOutputFactory {
    written: Arc<Mutex<Vec<String>>>,
}

impl OutputFactory for CollectOutputFactory {
    fn class_name(&self) -> &str {
        "test.collect"
    }

    fn create(&self, cfg: &ConfigMap) -> Result<Arc<dyn OutputSink>, StageError> {
        Ok(Arc::new(CollectOutput {
            written: self.written.clone(),
            fail: id_set(cfg, "fail"),
            systemic: config::optional_str(cfg, "systemic")?.map(str::to_string),
        }))
    }
}

struct NullStore;

#[async_trait]
impl GraphStore for NullStore {
    async fn read(&self, _query: &str, _params: &Row) -> Result<Vec<Row>, StoreError> {
        Ok(Vec::new())
    }

    async fn write(&self, _query: &str, _params: &Row) -> Result<u64, StoreError> {
        Ok(1)
    }
}

fn test_runtime() -> (PipelineRuntime, Arc<Mutex<Vec<String>>>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("piperuntime=debug")
        .with_test_writer()
        .try_init();
    let written = Arc::new(Mutex::new(Vec::new()));
    let mut registry = CapabilityRegistry::new();
    registry.register_input(Arc::new(TickerInputFactory)).unwrap();
    registry
        .register_input(Arc::new(FailOpenInputFactory))
        .unwrap();
    registry
        .register_processor(Arc::new(MarkProcessorFactory))
        .unwrap();
    registry
        .register_output(Arc::new(CollectOutputFactory {
            written: written.clone(),
        }))
        .unwrap();
    registry
        .register_task_class(ComponentDescriptor::new(Role::Task, "test.task"))
        .unwrap();
    (PipelineRuntime::new(Arc::new(NullStore), registry), written)
}

async fn build_task(
    runtime: &PipelineRuntime,
    input_class: &str,
    input_cfg: ConfigMap,
    proc_cfg: ConfigMap,
    out_cfg: ConfigMap,
    sync: bool,
) {
    runtime
        .create_input("in", input_class, &input_cfg)
        .await
        .unwrap();
    runtime
        .create_processor("proc", "test.mark", &proc_cfg)
        .await
        .unwrap();
    runtime
        .create_output("out", "test.collect", &out_cfg)
        .await
        .unwrap();
    runtime
        .create_task(
            "task",
            "test.task",
            TaskBinding {
                input: "in".to_string(),
                processor: "proc".to_string(),
                output: "out".to_string(),
                sync,
            },
        )
        .await
        .unwrap();
}

async fn task_status(runtime: &PipelineRuntime, name: &str) -> RunStatus {
    runtime
        .list_tasks()
        .await
        .into_iter()
        .find(|t| t.name == name)
        .unwrap()
        .status
}

async fn wait_terminal(runtime: &PipelineRuntime, name: &str) -> RunStatus {
    for _ in 0..500 {
        let status = task_status(runtime, name).await;
        if status.state.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task '{}' did not reach a terminal state", name);
}

fn ids(values: &[&str]) -> Value {
    Value::Array(values.iter().map(|v| Value::from(*v)).collect())
}

#[tokio::test]
async fn starting_unknown_task_fails() {
    let (runtime, _) = test_runtime();
    let err = runtime.start_task("missing").await.unwrap_err();
    assert!(matches!(err, TaskError::TaskNotFound(_)));
}

#[tokio::test]
async fn sync_run_processes_all_records() {
    let (runtime, written) = test_runtime();
    let mut input_cfg = ConfigMap::new();
    input_cfg.insert("count".to_string(), Value::from(10u64));
    build_task(
        &runtime,
        "test.ticker",
        input_cfg,
        ConfigMap::new(),
        ConfigMap::new(),
        true,
    )
    .await;

    let outcome = runtime.start_task("task").await.unwrap();
    let status = match outcome {
        StartOutcome::Finished(status) => status,
        StartOutcome::Accepted { .. } => panic!("sync start must finish before returning"),
    };
    assert_eq!(status.state, TaskState::Completed);
    assert_eq!(status.records_processed, 10);
    assert_eq!(status.records_failed, 0);
    assert!(status.last_error.is_none());
    assert_eq!(written.lock().unwrap().len(), 10);
}

#[tokio::test]
async fn processor_failures_are_isolated_per_record() {
    let (runtime, written) = test_runtime();
    let mut input_cfg = ConfigMap::new();
    input_cfg.insert("count".to_string(), Value::from(10u64));
    let mut proc_cfg = ConfigMap::new();
    proc_cfg.insert("fail".to_string(), ids(&["3", "7"]));
    build_task(
        &runtime,
        "test.ticker",
        input_cfg,
        proc_cfg,
        ConfigMap::new(),
        true,
    )
    .await;

    let outcome = runtime.start_task("task").await.unwrap();
    let status = match outcome {
        StartOutcome::Finished(status) => status,
        StartOutcome::Accepted { .. } => panic!("sync start must finish before returning"),
    };
    // Failure counts are observability, not run failure.
    assert_eq!(status.state, TaskState::Completed);
    assert_eq!(status.records_processed, 8);
    assert_eq!(status.records_failed, 2);
    assert!(status.last_error.is_some());

    let written = written.lock().unwrap();
    assert_eq!(written.len(), 8);
    assert!(!written.contains(&"3".to_string()));
    assert!(!written.contains(&"7".to_string()));
}

#[tokio::test]
async fn output_failures_are_isolated_per_record() {
    let (runtime, written) = test_runtime();
    let mut input_cfg = ConfigMap::new();
    input_cfg.insert("count".to_string(), Value::from(6u64));
    let mut out_cfg = ConfigMap::new();
    out_cfg.insert("fail".to_string(), ids(&["0"]));
    build_task(
        &runtime,
        "test.ticker",
        input_cfg,
        ConfigMap::new(),
        out_cfg,
        true,
    )
    .await;

    let outcome = runtime.start_task("task").await.unwrap();
    let status = match outcome {
        StartOutcome::Finished(status) => status,
        StartOutcome::Accepted { .. } => panic!("sync start must finish before returning"),
    };
    assert_eq!(status.state, TaskState::Completed);
    assert_eq!(status.records_processed, 5);
    assert_eq!(status.records_failed, 1);
    assert_eq!(written.lock().unwrap().len(), 5);
}

#[tokio::test]
async fn input_open_failure_fails_the_run() {
    let (runtime, written) = test_runtime();
    build_task(
        &runtime,
        "test.fail_open",
        ConfigMap::new(),
        ConfigMap::new(),
        ConfigMap::new(),
        true,
    )
    .await;

    let outcome = runtime.start_task("task").await.unwrap();
    let status = match outcome {
        StartOutcome::Finished(status) => status,
        StartOutcome::Accepted { .. } => panic!("sync start must finish before returning"),
    };
    assert_eq!(status.state, TaskState::Failed);
    assert_eq!(status.records_processed, 0);
    assert!(status.last_error.is_some());
    assert!(written.lock().unwrap().is_empty());
}

#[tokio::test]
async fn systemic_output_fault_aborts_remaining_records() {
    let (runtime, written) = test_runtime();
    let mut input_cfg = ConfigMap::new();
    input_cfg.insert("count".to_string(), Value::from(10u64));
    let mut out_cfg = ConfigMap::new();
    out_cfg.insert("systemic".to_string(), Value::from("5"));
    build_task(
        &runtime,
        "test.ticker",
        input_cfg,
        ConfigMap::new(),
        out_cfg,
        true,
    )
    .await;

    let outcome = runtime.start_task("task").await.unwrap();
    let status = match outcome {
        StartOutcome::Finished(status) => status,
        StartOutcome::Accepted { .. } => panic!("sync start must finish before returning"),
    };
    assert_eq!(status.state, TaskState::Failed);
    assert_eq!(status.records_processed, 5);
    assert_eq!(written.lock().unwrap().len(), 5);
}

#[tokio::test]
async fn starting_a_running_task_fails() {
    let (runtime, _) = test_runtime();
    let mut input_cfg = ConfigMap::new();
    input_cfg.insert("count".to_string(), Value::from(50u64));
    input_cfg.insert("delay_ms".to_string(), Value::from(20u64));
    build_task(
        &runtime,
        "test.ticker",
        input_cfg,
        ConfigMap::new(),
        ConfigMap::new(),
        false,
    )
    .await;

    let outcome = runtime.start_task("task").await.unwrap();
    assert!(matches!(outcome, StartOutcome::Accepted { .. }));

    let err = runtime.start_task("task").await.unwrap_err();
    assert!(matches!(err, TaskError::TaskAlreadyRunning(_)));

    assert!(runtime.stop_task("task").await.unwrap());
    let status = wait_terminal(&runtime, "task").await;
    assert_eq!(status.state, TaskState::Stopped);
}

#[tokio::test]
async fn async_run_reports_final_state_via_task_list() {
    let (runtime, written) = test_runtime();
    let mut input_cfg = ConfigMap::new();
    input_cfg.insert("count".to_string(), Value::from(5u64));
    input_cfg.insert("delay_ms".to_string(), Value::from(5u64));
    build_task(
        &runtime,
        "test.ticker",
        input_cfg,
        ConfigMap::new(),
        ConfigMap::new(),
        false,
    )
    .await;

    let outcome = runtime.start_task("task").await.unwrap();
    assert!(matches!(outcome, StartOutcome::Accepted { .. }));

    let status = wait_terminal(&runtime, "task").await;
    assert_eq!(status.state, TaskState::Completed);
    assert_eq!(status.records_processed, 5);
    assert_eq!(written.lock().unwrap().len(), 5);
}

#[tokio::test]
async fn stop_halts_between_records() {
    let (runtime, written) = test_runtime();
    let mut input_cfg = ConfigMap::new();
    input_cfg.insert("count".to_string(), Value::from(200u64));
    input_cfg.insert("delay_ms".to_string(), Value::from(10u64));
    build_task(
        &runtime,
        "test.ticker",
        input_cfg,
        ConfigMap::new(),
        ConfigMap::new(),
        false,
    )
    .await;

    runtime.start_task("task").await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(runtime.stop_task("task").await.unwrap());

    let status = wait_terminal(&runtime, "task").await;
    assert_eq!(status.state, TaskState::Stopped);
    assert!(status.records_processed < 200);

    // No further records after the signal was observed.
    let processed_after_stop = status.records_processed;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        written.lock().unwrap().len() as u64,
        processed_after_stop
    );
}

#[tokio::test]
async fn terminal_task_can_be_started_again() {
    let (runtime, written) = test_runtime();
    let mut input_cfg = ConfigMap::new();
    input_cfg.insert("count".to_string(), Value::from(3u64));
    build_task(
        &runtime,
        "test.ticker",
        input_cfg,
        ConfigMap::new(),
        ConfigMap::new(),
        true,
    )
    .await;

    for _ in 0..2 {
        let outcome = runtime.start_task("task").await.unwrap();
        let status = match outcome {
            StartOutcome::Finished(status) => status,
            StartOutcome::Accepted { .. } => panic!("sync start must finish before returning"),
        };
        // Counters reset per run.
        assert_eq!(status.state, TaskState::Completed);
        assert_eq!(status.records_processed, 3);
    }
    assert_eq!(written.lock().unwrap().len(), 6);
}

#[tokio::test]
async fn run_events_bracket_the_run() {
    let (runtime, _) = test_runtime();
    let mut input_cfg = ConfigMap::new();
    input_cfg.insert("count".to_string(), Value::from(2u64));
    let mut proc_cfg = ConfigMap::new();
    proc_cfg.insert("fail".to_string(), ids(&["1"]));
    build_task(
        &runtime,
        "test.ticker",
        input_cfg,
        proc_cfg,
        ConfigMap::new(),
        true,
    )
    .await;

    let mut events = runtime.subscribe_events();
    runtime.start_task("task").await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(RunEvent::TaskStarted { .. })));
    assert!(seen
        .iter()
        .any(|e| matches!(e, RunEvent::RecordFailed { record_id: Some(id), .. } if id == "1")));
    assert!(matches!(
        seen.last(),
        Some(RunEvent::TaskCompleted {
            records_processed: 1,
            records_failed: 1,
            ..
        })
    ));
}

#[tokio::test]
async fn stopping_a_task_that_is_not_running_is_a_noop() {
    let (runtime, _) = test_runtime();
    let mut input_cfg = ConfigMap::new();
    input_cfg.insert("count".to_string(), Value::from(1u64));
    build_task(
        &runtime,
        "test.ticker",
        input_cfg,
        ConfigMap::new(),
        ConfigMap::new(),
        true,
    )
    .await;

    assert!(!runtime.stop_task("task").await.unwrap());

    let err = runtime.stop_task("missing").await.unwrap_err();
    assert!(matches!(err, TaskError::TaskNotFound(_)));
}
