//! # Trace: Step Lifecycle Events
//!
//! [`TracingLayer`] decorates every node of a flow, singles, sequences and
//! branches alike, and reports when it starts and how it ended to a
//! [`TraceEventListener`]. Events carry the run id and the node's
//! [`StepId`], which is also the key into the flow's
//! [`TraceMap`](stepwise_core::TraceMap).
//!
//! Each node also runs inside an `info_span!("Step", ..)` so that anything
//! logged by the operation itself is attributed to the step.

use crate::compiler::{BoxedCompiler, CompilerLayer};
use std::sync::Arc;
use std::time::Instant;
use stepwise_core::{
    Action, AnyKey, Condition, Failure, FlowVisitor, Operation, RunId, ScratchValue, Slot,
    StepHeader, StepId,
};

pub trait TraceEventListener: Send + Sync {
    fn step_started(&self, run_id: RunId, step_id: StepId);

    fn step_succeeded(&self, run_id: RunId, step_id: StepId, output: &dyn ScratchValue);

    /// Called both for failures recorded under the step's key and for errors
    /// that abort the run.
    fn step_failed(&self, run_id: RunId, step_id: StepId, reason: &Failure);
}

/// [`TraceEventListener`] writing to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventListener;

impl TraceEventListener for TracingEventListener {
    fn step_started(&self, run_id: RunId, step_id: StepId) {
        tracing::trace!(stepwise.run_id = %run_id, stepwise.step_id = %step_id, "step started");
    }

    fn step_succeeded(&self, run_id: RunId, step_id: StepId, output: &dyn ScratchValue) {
        tracing::debug!(
            stepwise.run_id = %run_id,
            stepwise.step_id = %step_id,
            output = %output.snapshot(),
            "step succeeded"
        );
    }

    fn step_failed(&self, run_id: RunId, step_id: StepId, reason: &Failure) {
        tracing::debug!(
            stepwise.run_id = %run_id,
            stepwise.step_id = %step_id,
            reason = %reason,
            "step failed"
        );
    }
}

/// Reports every node's lifecycle to a [`TraceEventListener`].
#[derive(Clone)]
pub struct TracingLayer {
    listener: Arc<dyn TraceEventListener>,
}

impl TracingLayer {
    pub fn new(listener: Arc<dyn TraceEventListener>) -> Self {
        Self { listener }
    }
}

impl Default for TracingLayer {
    fn default() -> Self {
        Self::new(Arc::new(TracingEventListener))
    }
}

impl CompilerLayer for TracingLayer {
    fn layer(&self, inner: BoxedCompiler) -> BoxedCompiler {
        Box::new(TracingCompiler {
            inner,
            listener: Arc::clone(&self.listener),
        })
    }
}

struct TracingCompiler {
    inner: BoxedCompiler,
    listener: Arc<dyn TraceEventListener>,
}

impl TracingCompiler {
    fn traced(&self, step: &StepHeader, label: String, action: Action) -> Action {
        let listener = Arc::clone(&self.listener);
        let step_id = step.id();
        let provided: AnyKey = step.provided_key().clone();

        Action::new(move |run_id, scratchpad| {
            let span = tracing::info_span!(
                "Step",
                stepwise.step = %label,
                stepwise.step_id = %step_id
            );
            let _entered = span.enter();
            let start = Instant::now();

            listener.step_started(run_id, step_id);
            let result = action.run(run_id, scratchpad);
            let duration = start.elapsed();

            match &result {
                Ok(scratchpad) => match scratchpad.slot(&provided) {
                    Some(Slot::Value(value)) => {
                        tracing::debug!(?duration, "step completed");
                        listener.step_succeeded(run_id, step_id, &**value);
                    }
                    Some(Slot::Failure(reason)) => {
                        tracing::debug!(?duration, reason = %reason, "step recorded a failure");
                        listener.step_failed(run_id, step_id, reason);
                    }
                    None => {
                        tracing::warn!(?duration, key = provided.name(), "step did not write its key");
                    }
                },
                Err(err) => {
                    tracing::error!(error = %err, ?duration, "step aborted the run");
                    listener.step_failed(run_id, step_id, &Failure::new(err.clone()));
                }
            }
            result
        })
    }
}

impl FlowVisitor for TracingCompiler {
    type Output = Action;

    fn visit_single(&self, step: &StepHeader, operation: Arc<dyn Operation>) -> Action {
        let label = operation.name().to_string();
        let action = self.inner.visit_single(step, operation);
        self.traced(step, label, action)
    }

    fn visit_sequence(&self, step: &StepHeader, items: Vec<Action>) -> Action {
        let action = self.inner.visit_sequence(step, items);
        self.traced(step, "Sequence".into(), action)
    }

    fn visit_branch(
        &self,
        step: &StepHeader,
        default: Action,
        arms: Vec<(Condition, Action)>,
    ) -> Action {
        let action = self.inner.visit_branch(step, default, arms);
        self.traced(step, "Branch".into(), action)
    }

    fn visit_condition(&self, condition: Condition) -> Condition {
        self.inner.visit_condition(condition)
    }
}
