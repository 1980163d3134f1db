//! # Logging: Operation and Condition Notifications
//!
//! [`LoggingLayer`] reports every single step and every branch condition to a
//! [`FlowLogger`]. The default logger, [`TracingFlowLogger`], turns those
//! notifications into `tracing` events under the `stepwise::flow` target.

use crate::compiler::{BoxedCompiler, CompilerLayer};
use std::sync::Arc;
use stepwise_core::{
    Action, AnyKey, Condition, Failure, FlowError, FlowVisitor, Operation, RunId, Slot,
    StepHeader,
};

/// Receives notifications from a [`LoggingLayer`].
///
/// Conditions carry no run id; they run inside the run's `Flow` span.
pub trait FlowLogger: Send + Sync {
    fn operation_started(&self, run_id: RunId, operation: &str, output: &AnyKey);

    fn operation_completed(&self, run_id: RunId, operation: &str, output: &AnyKey);

    /// The operation ran and its failure was recorded under `output`.
    fn operation_failed(&self, run_id: RunId, operation: &str, output: &AnyKey, reason: &Failure);

    /// The run was aborted while this operation was in progress.
    fn operation_aborted(&self, run_id: RunId, operation: &str, output: &AnyKey, error: &FlowError);

    fn condition_started(&self, condition: &str);

    fn condition_completed(&self, condition: &str, result: bool);

    fn condition_failed(&self, condition: &str, error: &FlowError);
}

/// [`FlowLogger`] writing to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFlowLogger;

impl FlowLogger for TracingFlowLogger {
    fn operation_started(&self, run_id: RunId, operation: &str, output: &AnyKey) {
        tracing::debug!(
            target: "stepwise::flow",
            run_id = %run_id,
            step = operation,
            output = output.name(),
            "operation started"
        );
    }

    fn operation_completed(&self, run_id: RunId, operation: &str, output: &AnyKey) {
        tracing::info!(
            target: "stepwise::flow",
            run_id = %run_id,
            step = operation,
            output = output.name(),
            "operation completed"
        );
    }

    fn operation_failed(&self, run_id: RunId, operation: &str, output: &AnyKey, reason: &Failure) {
        tracing::warn!(
            target: "stepwise::flow",
            run_id = %run_id,
            step = operation,
            output = output.name(),
            reason = %reason,
            "operation failed"
        );
    }

    fn operation_aborted(&self, run_id: RunId, operation: &str, output: &AnyKey, error: &FlowError) {
        tracing::error!(
            target: "stepwise::flow",
            run_id = %run_id,
            step = operation,
            output = output.name(),
            error = %error,
            "operation aborted the run"
        );
    }

    fn condition_started(&self, condition: &str) {
        tracing::debug!(target: "stepwise::flow", condition, "condition started");
    }

    fn condition_completed(&self, condition: &str, result: bool) {
        tracing::debug!(target: "stepwise::flow", condition, result, "condition completed");
    }

    fn condition_failed(&self, condition: &str, error: &FlowError) {
        tracing::error!(target: "stepwise::flow", condition, error = %error, "condition failed");
    }
}

/// Reports single steps and conditions to a [`FlowLogger`].
#[derive(Clone)]
pub struct LoggingLayer {
    logger: Arc<dyn FlowLogger>,
}

impl LoggingLayer {
    pub fn new(logger: Arc<dyn FlowLogger>) -> Self {
        Self { logger }
    }

    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingFlowLogger))
    }
}

impl Default for LoggingLayer {
    fn default() -> Self {
        Self::tracing()
    }
}

impl CompilerLayer for LoggingLayer {
    fn layer(&self, inner: BoxedCompiler) -> BoxedCompiler {
        Box::new(LoggingCompiler {
            inner,
            logger: Arc::clone(&self.logger),
        })
    }
}

struct LoggingCompiler {
    inner: BoxedCompiler,
    logger: Arc<dyn FlowLogger>,
}

impl FlowVisitor for LoggingCompiler {
    type Output = Action;

    fn visit_single(&self, step: &StepHeader, operation: Arc<dyn Operation>) -> Action {
        let name = operation.name().to_string();
        let output = step.provided_key().clone();
        let action = self.inner.visit_single(step, operation);
        let logger = Arc::clone(&self.logger);

        Action::new(move |run_id, scratchpad| {
            logger.operation_started(run_id, &name, &output);
            match action.run(run_id, scratchpad) {
                Ok(scratchpad) => {
                    match scratchpad.slot(&output) {
                        Some(Slot::Failure(reason)) => {
                            logger.operation_failed(run_id, &name, &output, reason)
                        }
                        _ => logger.operation_completed(run_id, &name, &output),
                    }
                    Ok(scratchpad)
                }
                Err(err) => {
                    logger.operation_aborted(run_id, &name, &output, &err);
                    Err(err)
                }
            }
        })
    }

    fn visit_sequence(&self, step: &StepHeader, items: Vec<Action>) -> Action {
        self.inner.visit_sequence(step, items)
    }

    fn visit_branch(
        &self,
        step: &StepHeader,
        default: Action,
        arms: Vec<(Condition, Action)>,
    ) -> Action {
        self.inner.visit_branch(step, default, arms)
    }

    fn visit_condition(&self, condition: Condition) -> Condition {
        let logger = Arc::clone(&self.logger);
        self.inner
            .visit_condition(condition)
            .wrap(move |scratchpad, inner| {
                logger.condition_started(inner.description());
                match inner.test(scratchpad) {
                    Ok(result) => {
                        logger.condition_completed(inner.description(), result);
                        Ok(result)
                    }
                    Err(err) => {
                        logger.condition_failed(inner.description(), &err);
                        Err(err)
                    }
                }
            })
    }
}
