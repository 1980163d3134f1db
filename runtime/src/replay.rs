use crate::recorder::{TraceEvent, TraceStore};
use stepwise_core::{RunId, TraceMap};

/// Steps through a recorded run one event at a time.
pub struct TraceReplay {
    trace_map: TraceMap,
    events: Vec<TraceEvent>,
    cursor: usize,
}

#[derive(Debug, Clone)]
pub struct ReplayFrame {
    /// Description of the trace map node the event belongs to, if the event
    /// refers to a node of this map.
    pub description: Option<String>,
    pub event: TraceEvent,
}

impl TraceReplay {
    pub fn new(trace_map: TraceMap, events: Vec<TraceEvent>) -> Self {
        Self {
            trace_map,
            events,
            cursor: 0,
        }
    }

    /// `None` when the store has no trace map for the run.
    pub fn from_store<S: TraceStore + ?Sized>(store: &S, run_id: RunId) -> Option<Self> {
        let trace_map = store.trace_map(run_id)?;
        Some(Self::new(trace_map, store.events(run_id)))
    }

    pub fn trace_map(&self) -> &TraceMap {
        &self.trace_map
    }

    /// Advance by one event. Returns `None` once every event was replayed.
    pub fn next_step(&mut self) -> Option<ReplayFrame> {
        let event = self.events.get(self.cursor)?.clone();
        self.cursor += 1;

        let description = self
            .trace_map
            .find(event.step_id())
            .map(|node| node.description.clone());

        Some(ReplayFrame { description, event })
    }

    pub fn remaining(&self) -> usize {
        self.events.len().saturating_sub(self.cursor)
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}
