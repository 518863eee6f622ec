use crate::instances::InstanceRegistry;
use crate::tasks::{TaskHandle, TaskManager};
use futures::StreamExt;
use pipecore::{
    EventBus, GraphStore, InputSource, OutputSink, Processor, RunId, RunStatus, StageContext,
    StageError, TaskError, TaskState,
};
use std::sync::Arc;

/// What `start` returns, depending on the task's sync flag.
#[derive(Debug, Clone)]
pub enum StartOutcome {
    /// Sync run reached a terminal state before returning
    Finished(RunStatus),
    /// Async run was accepted and proceeds in the background
    Accepted { run_id: RunId },
}

enum RunOutcome {
    Completed,
    Stopped,
    Failed(StageError),
}

/// Runs bound tasks: streams records from the input through the processor
/// into the output, isolating per-record failures and honoring the
/// sync/async contract.
pub struct TaskExecutor {
    store: Arc<dyn GraphStore>,
    events: Arc<EventBus>,
}

impl TaskExecutor {
    pub fn new(store: Arc<dyn GraphStore>, events: Arc<EventBus>) -> Self {
        Self { store, events }
    }

    /// Start a run for the named task.
    ///
    /// With `sync=true` this returns only once the run reaches a terminal
    /// state; with `sync=false` it returns right after entering `Running`
    /// and the final state is read later from the task list.
    pub async fn start(
        &self,
        manager: &TaskManager,
        instances: &InstanceRegistry,
        name: &str,
    ) -> Result<StartOutcome, TaskError> {
        let handle = manager.get(name).await?;
        let definition = handle.definition().clone();

        let input = instances.get_input(&definition.binding.input).await?;
        let processor = instances.get_processor(&definition.binding.processor).await?;
        let output = instances.get_output(&definition.binding.output).await?;

        let cancellation = handle.begin_run().await?;
        let run_id = RunId::new_v4();
        let ctx = StageContext {
            run_id,
            store: self.store.clone(),
            events: self.events.emitter(run_id, definition.name.clone()),
            cancellation,
        };

        if definition.binding.sync {
            run_task(handle.clone(), input, processor, output, ctx).await;
            Ok(StartOutcome::Finished(handle.status().await))
        } else {
            tokio::spawn(run_task(handle, input, processor, output, ctx));
            Ok(StartOutcome::Accepted { run_id })
        }
    }

    /// Signal cooperative cancellation for a running task. The executor
    /// observes the signal between records. Returns whether a running run
    /// was signalled.
    pub async fn stop(&self, manager: &TaskManager, name: &str) -> Result<bool, TaskError> {
        let handle = manager.get(name).await?;
        let signalled = handle.signal_stop().await;
        if signalled {
            tracing::info!(task = name, "stop signalled");
        } else {
            tracing::debug!(task = name, "stop requested but task is not running");
        }
        Ok(signalled)
    }
}

async fn run_task(
    handle: Arc<TaskHandle>,
    input: Arc<dyn InputSource>,
    processor: Arc<dyn Processor>,
    output: Arc<dyn OutputSink>,
    ctx: StageContext,
) {
    let events = ctx.events.clone();
    events.started();
    tracing::info!(task = handle.name(), run = %ctx.run_id, "task run started");

    let outcome = run_records(&handle, input, processor, output, &ctx).await;

    match outcome {
        RunOutcome::Completed => {
            let status = handle.finish(TaskState::Completed, None).await;
            events.completed(status.records_processed, status.records_failed);
            tracing::info!(
                task = handle.name(),
                run = %ctx.run_id,
                processed = status.records_processed,
                failed = status.records_failed,
                "task run completed"
            );
        }
        RunOutcome::Stopped => {
            let status = handle.finish(TaskState::Stopped, None).await;
            events.stopped(status.records_processed);
            tracing::info!(
                task = handle.name(),
                run = %ctx.run_id,
                processed = status.records_processed,
                "task run stopped"
            );
        }
        RunOutcome::Failed(error) => {
            let message = error.to_string();
            handle.finish(TaskState::Failed, Some(message.clone())).await;
            events.failed(message.clone());
            tracing::error!(task = handle.name(), run = %ctx.run_id, error = %message, "task run failed");
        }
    }
}

/// The record loop. Per-record failures are counted and the run
/// continues; systemic faults abort; cancellation is observed between
/// records. The input stream is dropped (releasing its cursor) on every
/// exit path.
async fn run_records(
    handle: &TaskHandle,
    input: Arc<dyn InputSource>,
    processor: Arc<dyn Processor>,
    output: Arc<dyn OutputSink>,
    ctx: &StageContext,
) -> RunOutcome {
    let mut records = match input.open(ctx.clone()).await {
        Ok(stream) => stream,
        Err(error) => return RunOutcome::Failed(error),
    };
    if let Err(error) = output.prepare(ctx).await {
        return RunOutcome::Failed(error);
    }

    loop {
        if ctx.cancellation.is_cancelled() {
            return RunOutcome::Stopped;
        }
        let record = match records.next().await {
            None => return RunOutcome::Completed,
            Some(Ok(record)) => record,
            Some(Err(StageError::Cancelled)) => return RunOutcome::Stopped,
            Some(Err(error)) if error.is_systemic() => return RunOutcome::Failed(error),
            Some(Err(error)) => {
                isolate_failure(handle, ctx, None, &error).await;
                continue;
            }
        };

        let record_id = record.id.clone();
        let processed = match processor.process(record, ctx).await {
            Ok(processed) => processed,
            Err(StageError::Cancelled) => return RunOutcome::Stopped,
            Err(error) if error.is_systemic() => return RunOutcome::Failed(error),
            Err(error) => {
                isolate_failure(handle, ctx, Some(record_id), &error).await;
                continue;
            }
        };

        match output.write(processed, ctx).await {
            Ok(()) => handle.record_processed().await,
            Err(StageError::Cancelled) => return RunOutcome::Stopped,
            Err(error) if error.is_systemic() => return RunOutcome::Failed(error),
            Err(error) => isolate_failure(handle, ctx, Some(record_id), &error).await,
        }
    }
}

async fn isolate_failure(
    handle: &TaskHandle,
    ctx: &StageContext,
    record_id: Option<String>,
    error: &StageError,
) {
    let message = error.to_string();
    tracing::warn!(
        task = handle.name(),
        run = %ctx.run_id,
        record = record_id.as_deref().unwrap_or("?"),
        error = %message,
        "record failed"
    );
    handle.record_failed(&message).await;
    ctx.events.record_failed(record_id, message);
}
