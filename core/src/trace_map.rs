use crate::condition::Condition;
use crate::flow::{Flow, FlowKind, StepHeader, StepId};
use crate::key::key_names;
use crate::operation::Operation;
use crate::visitor::FlowVisitor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The static view of a flow.
///
/// `TraceMap` mirrors the flow tree one node per step, keyed by [`StepId`],
/// so trace events recorded during a run can be tied back to the part of the
/// flow that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMap {
    pub step_id: StepId,
    pub kind: FlowKind,
    /// Operation name for single steps, `Sequence` or `Branch` otherwise.
    pub description: String,
    pub required_keys: Vec<String>,
    pub provided_key: String,
    pub children: Vec<TraceChild>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceChild {
    /// Position in a sequence, condition description in a branch, or
    /// `Otherwise` for a branch's default.
    pub label: String,
    pub map: TraceMap,
}

impl TraceMap {
    pub fn of<T>(flow: &Flow<T>) -> Self {
        flow.visit(&TraceMapBuilder)
    }

    pub fn find(&self, step_id: StepId) -> Option<&TraceMap> {
        self.iter().find(|node| node.step_id == step_id)
    }

    /// Depth-first, parents before children.
    pub fn iter(&self) -> impl Iterator<Item = &TraceMap> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev().map(|child| &child.map));
            Some(node)
        })
    }

    pub fn node_count(&self) -> usize {
        self.iter().count()
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, label: Option<&str>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match label {
            Some(label) => write!(f, "{indent}{label}: ")?,
            None => write!(f, "{indent}")?,
        }
        writeln!(
            f,
            "{} ({} -> {})",
            self.description,
            self.required_keys.join(", "),
            self.provided_key
        )?;
        for child in &self.children {
            child.map.write_tree(f, Some(&child.label), depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for TraceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, None, 0)
    }
}

/// Visitor producing a [`TraceMap`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceMapBuilder;

impl TraceMapBuilder {
    fn node(step: &StepHeader, kind: FlowKind, description: String, children: Vec<TraceChild>) -> TraceMap {
        TraceMap {
            step_id: step.id(),
            kind,
            description,
            required_keys: key_names(step.required_keys()),
            provided_key: step.provided_key().name().to_string(),
            children,
        }
    }
}

impl FlowVisitor for TraceMapBuilder {
    type Output = TraceMap;

    fn visit_single(&self, step: &StepHeader, operation: Arc<dyn Operation>) -> TraceMap {
        Self::node(step, FlowKind::Single, operation.name().to_string(), Vec::new())
    }

    fn visit_sequence(&self, step: &StepHeader, items: Vec<TraceMap>) -> TraceMap {
        let children = items
            .into_iter()
            .enumerate()
            .map(|(index, map)| TraceChild {
                label: index.to_string(),
                map,
            })
            .collect();
        Self::node(step, FlowKind::Sequence, "Sequence".into(), children)
    }

    fn visit_branch(
        &self,
        step: &StepHeader,
        default: TraceMap,
        arms: Vec<(Condition, TraceMap)>,
    ) -> TraceMap {
        let mut children: Vec<TraceChild> = arms
            .into_iter()
            .map(|(condition, map)| TraceChild {
                label: condition.description().to_string(),
                map,
            })
            .collect();
        children.push(TraceChild {
            label: "Otherwise".into(),
            map: default,
        });
        Self::node(step, FlowKind::Branch, "Branch".into(), children)
    }

    fn visit_condition(&self, condition: Condition) -> Condition {
        condition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;

    fn weather_flow() -> (Flow<String>, Flow<bool>) {
        let user = Key::<String>::named("userName");
        let authorised = Key::<bool>::named("isAuthorised");
        let report = Key::<String>::named("weatherReport");

        let authorize = Flow::single("authorize", [user.erased()], &authorised, |_| Ok(true));
        let weather = Flow::single("getWeather", [], &report, |_| Ok("sunny".to_string()));
        let error = Flow::single("formatError", [user.erased()], &report, |_| Ok("no".to_string()));

        let decide = Flow::branch(Condition::key_equals(&authorised, true), &weather)
            .otherwise(&error)
            .unwrap();
        (authorize.then(&decide), authorize)
    }

    #[test]
    fn test_trace_map_mirrors_flow() {
        let (flow, authorize) = weather_flow();
        let map = TraceMap::of(&flow);

        assert_eq!(map.kind, FlowKind::Sequence);
        assert_eq!(map.step_id, flow.id());
        assert_eq!(map.required_keys, vec!["userName"]);
        assert_eq!(map.provided_key, "weatherReport");

        let labels: Vec<&str> = map.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["0", "1"]);

        let branch = &map.children[1].map;
        assert_eq!(branch.description, "Branch");
        let arms: Vec<&str> = branch.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(arms, vec!["isAuthorised == true", "Otherwise"]);

        assert_eq!(map.node_count(), 5);
        assert_eq!(map.find(authorize.id()).map(|n| n.description.as_str()), Some("authorize"));
    }

    #[test]
    fn test_iter_is_depth_first() {
        let (flow, _) = weather_flow();
        let map = TraceMap::of(&flow);
        let order: Vec<&str> = map.iter().map(|n| n.description.as_str()).collect();
        assert_eq!(
            order,
            vec!["Sequence", "authorize", "Branch", "getWeather", "formatError"]
        );
    }

    #[test]
    fn test_display_renders_tree() {
        let (flow, _) = weather_flow();
        let rendered = TraceMap::of(&flow).to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "Sequence (userName -> weatherReport)");
        assert_eq!(lines[1], "  0: authorize (userName -> isAuthorised)");
        assert_eq!(lines[3], "    isAuthorised == true: getWeather ( -> weatherReport)");
    }
}
