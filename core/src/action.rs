use crate::error::FlowError;
use crate::scratchpad::Scratchpad;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of one execution, shared by every log line and trace event it
/// produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type ActionResult = Result<Scratchpad, FlowError>;
pub type Executor = Arc<dyn Fn(RunId, Scratchpad) -> ActionResult + Send + Sync>;

/// A compiled step: scratchpad in, extended scratchpad out.
///
/// Actions hold no per-run state, so one action serves concurrent runs.
#[derive(Clone)]
pub struct Action {
    executor: Executor,
}

impl Action {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(RunId, Scratchpad) -> ActionResult + Send + Sync + 'static,
    {
        Self {
            executor: Arc::new(f),
        }
    }

    pub fn run(&self, run_id: RunId, scratchpad: Scratchpad) -> ActionResult {
        (self.executor)(run_id, scratchpad)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Action")
    }
}
