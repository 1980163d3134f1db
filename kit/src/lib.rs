//! Stepwise facade crate.
//!
//! Re-exports the core flow algebra, the runtime and (by default) the
//! `#[operation]` macro and subscriber setup under a single entry point.
//!
//! ```rust,ignore
//! use stepwise::prelude::*;
//!
//! let name = Key::<String>::named("name");
//! let greeting = Key::<String>::named("greeting");
//! let greet = step::from1("greet", &name, &greeting, |n: &String| Ok(format!("Hello, {n}")));
//!
//! let compiled = FlowConfig::from_env().compiler().compile(&greet);
//! let text = compiled.run(Scratchpad::from_values([name.of("Fred".into())]))?;
//! ```

pub use stepwise_core as core;
#[cfg(feature = "observe")]
pub use stepwise_observe as observe;
pub use stepwise_runtime as runtime;

pub use stepwise_core::{
    Condition, Failure, Flow, FlowError, Key, KeyValue, RunId, Scratchpad, ScratchpadError, step,
};
#[cfg(feature = "macros")]
pub use stepwise_macros::operation;
pub use stepwise_runtime::{CompiledFlow, FlowCompiler, FlowConfig};

pub mod prelude {
    pub use stepwise_core::prelude::*;
    #[cfg(feature = "macros")]
    pub use stepwise_macros::operation;
    pub use stepwise_runtime::prelude::*;
}
