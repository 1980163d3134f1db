use crate::compiler::{BoxedCompiler, CompilerLayer};
use std::sync::Arc;
use stepwise_core::{
    Action, Condition, FlowError, FlowVisitor, Operation, OperationError, Scratchpad, StepHeader,
    StoredValue,
};

/// Fails the run when an operation or condition changes values already in
/// the scratchpad.
///
/// Every stored value is snapshotted before and after each call and the two
/// are compared structurally, which catches changes made through interior
/// mutability (`Mutex`, `RwLock`, atomics) that the scratchpad cannot
/// prevent. This costs a full snapshot per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct MutationCheckLayer;

impl CompilerLayer for MutationCheckLayer {
    fn layer(&self, inner: BoxedCompiler) -> BoxedCompiler {
        Box::new(MutationChecker { inner })
    }
}

struct MutationChecker {
    inner: BoxedCompiler,
}

impl FlowVisitor for MutationChecker {
    type Output = Action;

    fn visit_single(&self, step: &StepHeader, operation: Arc<dyn Operation>) -> Action {
        self.inner
            .visit_single(step, Arc::new(CheckedOperation { inner: operation }))
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
        self.inner
            .visit_condition(condition)
            .wrap(|scratchpad, inner| {
                let before = scratchpad.snapshot();
                let result = inner.test(scratchpad);
                check_unchanged(inner.description(), &before, scratchpad)?;
                result
            })
    }
}

struct CheckedOperation {
    inner: Arc<dyn Operation>,
}

impl Operation for CheckedOperation {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn invoke(&self, scratchpad: &Scratchpad) -> Result<StoredValue, OperationError> {
        let before = scratchpad.snapshot();
        let result = self.inner.invoke(scratchpad);
        check_unchanged(self.inner.name(), &before, scratchpad)?;
        result
    }
}

fn check_unchanged(
    step: &str,
    before: &stepwise_core::Snapshot,
    scratchpad: &Scratchpad,
) -> Result<(), FlowError> {
    let keys = before.changed_keys(&scratchpad.snapshot());
    if keys.is_empty() {
        return Ok(());
    }
    tracing::error!(stepwise.step = step, keys = ?keys, "scratchpad mutated in place");
    Err(FlowError::MutationDetected {
        step: step.to_string(),
        keys,
    })
}
