//! Stepwise runtime.
//!
//! Compiles [`Flow`](stepwise_core::Flow)s into runnable actions, decorates
//! them with logging, mutation checking and trace events, and runs them
//! against a locked scratchpad.

pub mod compiler;
pub mod config;
pub mod execution;
pub mod logging;
pub mod mutation;
pub mod recorder;
pub mod replay;
pub mod trace;

pub mod prelude {
    pub use crate::compiler::{CompilerStack, FlowCompiler};
    pub use crate::config::FlowConfig;
    pub use crate::execution::CompiledFlow;
    pub use crate::recorder::{InMemoryTraceStore, RecordingRunner};
}

pub use compiler::{ActionCompiler, BoxedCompiler, CompilerLayer, CompilerStack, FlowCompiler};
pub use config::{ConfigError, FlowConfig};
pub use execution::CompiledFlow;
pub use logging::{FlowLogger, LoggingLayer, TracingFlowLogger};
pub use mutation::MutationCheckLayer;
pub use recorder::{InMemoryTraceStore, RecordingRunner, TraceEvent, TraceStore};
pub use replay::{ReplayFrame, TraceReplay};
pub use trace::{TraceEventListener, TracingEventListener, TracingLayer};
