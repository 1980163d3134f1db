//! Compiler - Flow to Action
//!
//! [`ActionCompiler`] is the base visitor turning a flow tree into a single
//! executable [`Action`]. Everything else a run can do (logging, mutation
//! checking, trace events) is added by [`CompilerLayer`]s that wrap the base
//! compiler, and a [`CompilerStack`] keeps those layers in order.

use crate::execution::CompiledFlow;
use std::sync::Arc;
use stepwise_core::{
    Action, Condition, Flow, FlowVisitor, KeyValue, Operation, OperationError, StepHeader,
    TraceMap,
};

/// A compiler with any layers already applied.
pub type BoxedCompiler = Box<dyn FlowVisitor<Output = Action> + Send + Sync>;

/// The undecorated compiler.
///
/// * Single: invoke the operation and write its value, or its recorded
///   failure, under the provided key. A fatal operation error aborts the run.
/// * Sequence: thread the scratchpad through every item in order.
/// * Branch: run the first arm whose condition holds, else the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionCompiler;

impl FlowVisitor for ActionCompiler {
    type Output = Action;

    fn visit_single(&self, step: &StepHeader, operation: Arc<dyn Operation>) -> Action {
        let provided = step.provided_key().clone();
        let step_id = step.id();
        Action::new(move |run_id, scratchpad| {
            tracing::trace!(
                stepwise.run_id = %run_id,
                stepwise.step_id = %step_id,
                stepwise.step = operation.name(),
                "invoking operation"
            );
            let written = match operation.invoke(&scratchpad) {
                Ok(value) => KeyValue::stored(provided.clone(), value),
                Err(OperationError::Failed(reason)) => KeyValue::failed(provided.clone(), reason),
                Err(OperationError::Fatal(err)) => return Err(err),
            };
            Ok(scratchpad.with_value(written)?)
        })
    }

    fn visit_sequence(&self, _step: &StepHeader, items: Vec<Action>) -> Action {
        Action::new(move |run_id, scratchpad| {
            items
                .iter()
                .try_fold(scratchpad, |scratchpad, item| item.run(run_id, scratchpad))
        })
    }

    fn visit_branch(
        &self,
        step: &StepHeader,
        default: Action,
        arms: Vec<(Condition, Action)>,
    ) -> Action {
        let step_id = step.id();
        Action::new(move |run_id, scratchpad| {
            for (condition, arm) in &arms {
                if condition.test(&scratchpad)? {
                    tracing::trace!(
                        stepwise.run_id = %run_id,
                        stepwise.step_id = %step_id,
                        condition = condition.description(),
                        "branch arm selected"
                    );
                    return arm.run(run_id, scratchpad);
                }
            }
            tracing::trace!(
                stepwise.run_id = %run_id,
                stepwise.step_id = %step_id,
                "branch default selected"
            );
            default.run(run_id, scratchpad)
        })
    }

    fn visit_condition(&self, condition: Condition) -> Condition {
        condition
    }
}

/// A decorator over a compiler.
///
/// Layers usually forward every visit to `inner` and wrap what comes back,
/// or wrap the operation / condition before handing it to `inner`.
pub trait CompilerLayer: Send + Sync {
    fn layer(&self, inner: BoxedCompiler) -> BoxedCompiler;
}

/// An ordered list of layers around [`ActionCompiler`].
///
/// The first layer added is the outermost: it sees every step before the
/// layers added after it.
#[derive(Clone, Default)]
pub struct CompilerStack {
    layers: Vec<Arc<dyn CompilerLayer>>,
}

impl CompilerStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer inside the ones already present.
    pub fn layer(mut self, layer: impl CompilerLayer + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    /// Add every layer of `other` inside the ones already present.
    pub fn append(mut self, other: CompilerStack) -> Self {
        self.layers.extend(other.layers);
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn build(&self) -> BoxedCompiler {
        self.layers
            .iter()
            .rev()
            .fold(Box::new(ActionCompiler) as BoxedCompiler, |inner, layer| {
                layer.layer(inner)
            })
    }
}

impl std::fmt::Debug for CompilerStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerStack")
            .field("layers", &self.layers.len())
            .finish()
    }
}

/// Entry point for turning flows into runnable [`CompiledFlow`]s.
#[derive(Debug, Clone, Default)]
pub struct FlowCompiler {
    stack: CompilerStack,
}

impl FlowCompiler {
    /// A compiler with no layers.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stack(stack: CompilerStack) -> Self {
        Self { stack }
    }

    pub fn stack(&self) -> &CompilerStack {
        &self.stack
    }

    pub fn compile_action<T>(&self, flow: &Flow<T>) -> Action {
        let compiler = self.stack.build();
        flow.visit(&*compiler)
    }

    /// The action together with the flow's [`TraceMap`].
    pub fn compile_traced<T>(&self, flow: &Flow<T>) -> (Action, TraceMap) {
        (self.compile_action(flow), TraceMap::of(flow))
    }

    pub fn compile<T>(&self, flow: &Flow<T>) -> CompiledFlow<T> {
        let (action, trace_map) = self.compile_traced(flow);
        tracing::debug!(
            stepwise.flow = %flow.id(),
            layers = self.stack.len(),
            steps = trace_map.node_count(),
            "compiled flow"
        );
        CompiledFlow::new(action, flow, trace_map)
    }
}
