//! Stepwise core.
//!
//! Flows are composed from single steps, each a named operation that reads
//! typed keys from a write-once [`Scratchpad`] and provides exactly one new
//! key. Composition is static: a [`Flow`] knows which keys it needs before it
//! runs, and turning it into something executable is the job of a
//! [`FlowVisitor`] (see the `stepwise-runtime` crate).

pub mod action;
pub mod condition;
pub mod error;
pub mod flow;
pub mod key;
pub mod operation;
pub mod scratchpad;
pub mod step;
pub mod trace_map;
pub mod value;
pub mod visitor;

pub use action::{Action, ActionResult, RunId};
pub use condition::Condition;
pub use error::{Failure, FlowError, OperationError, ScratchpadError};
pub use flow::{BranchBuilder, FailureBranch, Flow, FlowKind, ResultBranch, StepHeader, StepId};
pub use key::{AnyKey, Key, KeyId, KeySet, KeyValue, Slot, key_names};
pub use operation::{FnOperation, Operation};
pub use scratchpad::{Scratchpad, Snapshot};
pub use trace_map::{TraceChild, TraceMap, TraceMapBuilder};
pub use value::{ScratchValue, StoredValue};
pub use visitor::{Describer, FlowVisitor};

// Generated code from `stepwise-macros` refers to `::stepwise_core::anyhow`.
pub use anyhow;

pub mod prelude {
    pub use crate::action::RunId;
    pub use crate::condition::Condition;
    pub use crate::error::{Failure, FlowError};
    pub use crate::flow::Flow;
    pub use crate::key::Key;
    pub use crate::scratchpad::Scratchpad;
    pub use crate::step;
    pub use crate::trace_map::TraceMap;
}
