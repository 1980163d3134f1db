//! Visitor - Double Dispatch over the Flow Tree
//!
//! A [`FlowVisitor`] turns a flow into some other representation: an
//! executable [`Action`](crate::Action), a [`TraceMap`](crate::TraceMap), a
//! one-line description. [`Flow::visit`](crate::Flow::visit) walks the tree
//! post-order, so every callback receives its children already converted.

use crate::condition::Condition;
use crate::flow::StepHeader;
use crate::operation::Operation;
use std::sync::Arc;

pub trait FlowVisitor {
    type Output;

    fn visit_single(&self, step: &StepHeader, operation: Arc<dyn Operation>) -> Self::Output;

    fn visit_sequence(&self, step: &StepHeader, items: Vec<Self::Output>) -> Self::Output;

    fn visit_branch(
        &self,
        step: &StepHeader,
        default: Self::Output,
        arms: Vec<(Condition, Self::Output)>,
    ) -> Self::Output;

    /// Called for every branch condition before its branch is visited.
    /// Decorators forward to their inner visitor before wrapping.
    fn visit_condition(&self, condition: Condition) -> Condition;
}

/// Renders a flow as a single line, e.g.
/// `authorize then (if isAuthorised == true: getWeather otherwise formatError)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Describer;

impl FlowVisitor for Describer {
    type Output = String;

    fn visit_single(&self, _step: &StepHeader, operation: Arc<dyn Operation>) -> String {
        operation.name().to_string()
    }

    fn visit_sequence(&self, _step: &StepHeader, items: Vec<String>) -> String {
        items.join(" then ")
    }

    fn visit_branch(
        &self,
        _step: &StepHeader,
        default: String,
        arms: Vec<(Condition, String)>,
    ) -> String {
        let arms = arms
            .iter()
            .map(|(condition, arm)| format!("if {}: {}", condition.description(), arm))
            .collect::<Vec<_>>()
            .join(", ");
        format!("({arms} otherwise {default})")
    }

    fn visit_condition(&self, condition: Condition) -> Condition {
        condition
    }
}
