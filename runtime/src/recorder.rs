use crate::compiler::{CompilerStack, FlowCompiler};
use crate::replay::TraceReplay;
use crate::trace::{TraceEventListener, TracingLayer};
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stepwise_core::{Failure, Flow, FlowError, RunId, Scratchpad, ScratchValue, StepId, TraceMap};

/// One recorded step lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TraceEvent {
    StepStarted {
        step_id: StepId,
        timestamp: DateTime<Utc>,
    },
    StepSucceeded {
        step_id: StepId,
        output: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    StepFailed {
        step_id: StepId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl TraceEvent {
    pub fn step_id(&self) -> StepId {
        match self {
            TraceEvent::StepStarted { step_id, .. }
            | TraceEvent::StepSucceeded { step_id, .. }
            | TraceEvent::StepFailed { step_id, .. } => *step_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TraceEvent::StepStarted { timestamp, .. }
            | TraceEvent::StepSucceeded { timestamp, .. }
            | TraceEvent::StepFailed { timestamp, .. } => *timestamp,
        }
    }

    /// `Started`, `Succeeded` or `Failed`.
    pub fn outcome(&self) -> &'static str {
        match self {
            TraceEvent::StepStarted { .. } => "Started",
            TraceEvent::StepSucceeded { .. } => "Succeeded",
            TraceEvent::StepFailed { .. } => "Failed",
        }
    }
}

/// Storage for trace maps and events, keyed by run.
pub trait TraceStore: Send + Sync {
    fn store_trace_map(&self, run_id: RunId, trace_map: TraceMap);

    fn trace_map(&self, run_id: RunId) -> Option<TraceMap>;

    /// Events in the order they were recorded. Empty for unknown runs.
    fn events(&self, run_id: RunId) -> Vec<TraceEvent>;
}

#[derive(Debug, Default)]
struct RunTrace {
    trace_map: Option<TraceMap>,
    events: Vec<TraceEvent>,
}

/// Process-local [`TraceStore`] that also listens for the events it stores.
#[derive(Debug, Default)]
pub struct InMemoryTraceStore {
    runs: RwLock<AHashMap<RunId, RunTrace>>,
}

impl InMemoryTraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_ids(&self) -> Vec<RunId> {
        self.runs.read().keys().copied().collect()
    }

    pub fn clear(&self) {
        self.runs.write().clear();
    }

    fn record(&self, run_id: RunId, event: TraceEvent) {
        self.runs.write().entry(run_id).or_default().events.push(event);
    }
}

impl TraceStore for InMemoryTraceStore {
    fn store_trace_map(&self, run_id: RunId, trace_map: TraceMap) {
        self.runs.write().entry(run_id).or_default().trace_map = Some(trace_map);
    }

    fn trace_map(&self, run_id: RunId) -> Option<TraceMap> {
        self.runs
            .read()
            .get(&run_id)
            .and_then(|run| run.trace_map.clone())
    }

    fn events(&self, run_id: RunId) -> Vec<TraceEvent> {
        self.runs
            .read()
            .get(&run_id)
            .map(|run| run.events.clone())
            .unwrap_or_default()
    }
}

impl TraceEventListener for InMemoryTraceStore {
    fn step_started(&self, run_id: RunId, step_id: StepId) {
        self.record(
            run_id,
            TraceEvent::StepStarted {
                step_id,
                timestamp: Utc::now(),
            },
        );
    }

    fn step_succeeded(&self, run_id: RunId, step_id: StepId, output: &dyn ScratchValue) {
        self.record(
            run_id,
            TraceEvent::StepSucceeded {
                step_id,
                output: output.snapshot(),
                timestamp: Utc::now(),
            },
        );
    }

    fn step_failed(&self, run_id: RunId, step_id: StepId, reason: &Failure) {
        self.record(
            run_id,
            TraceEvent::StepFailed {
                step_id,
                reason: reason.to_string(),
                timestamp: Utc::now(),
            },
        );
    }
}

/// Runs flows with trace recording switched on.
///
/// The tracing layer is always outermost; any extra layers run inside it.
/// Each run's trace map is stored under its run id before the run starts.
pub struct RecordingRunner<S> {
    store: Arc<S>,
    compiler: FlowCompiler,
}

impl<S> RecordingRunner<S>
where
    S: TraceStore + TraceEventListener + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self::with_stack(store, CompilerStack::new())
    }

    pub fn with_stack(store: Arc<S>, stack: CompilerStack) -> Self {
        let listener: Arc<dyn TraceEventListener> = store.clone();
        let compiler =
            FlowCompiler::with_stack(CompilerStack::new().layer(TracingLayer::new(listener)).append(stack));
        Self { store, compiler }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn run<T>(&self, flow: &Flow<T>, initial: Scratchpad) -> (RunId, Result<T, FlowError>)
    where
        T: Clone + 'static,
    {
        let compiled = self.compiler.compile(flow);
        let run_id = RunId::new();
        self.store.store_trace_map(run_id, compiled.trace_map().clone());
        (run_id, compiled.run_with_id(run_id, initial))
    }

    pub fn replay(&self, run_id: RunId) -> Option<TraceReplay> {
        TraceReplay::from_store(&*self.store, run_id)
    }
}
