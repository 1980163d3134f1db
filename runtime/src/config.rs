//! Config - Choosing Compiler Layers
//!
//! [`FlowConfig`] switches the optional layers on and off. It can be read
//! from TOML or from the environment:
//!
//! | Variable                  | Field               |
//! |---------------------------|---------------------|
//! | `STEPWISE_LOGGING`        | `logging`           |
//! | `STEPWISE_MUTATION_CHECK` | `mutation_checking` |
//! | `STEPWISE_TRACING`        | `tracing`           |
//!
//! Values `1`, `true`, `on` and `yes` (any case) enable a layer; anything
//! else disables it. Unset variables keep the default (all off).

use crate::compiler::{CompilerStack, FlowCompiler};
use crate::logging::{FlowLogger, LoggingLayer, TracingFlowLogger};
use crate::mutation::MutationCheckLayer;
use crate::trace::{TraceEventListener, TracingEventListener, TracingLayer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub const LOGGING_ENV: &str = "STEPWISE_LOGGING";
pub const MUTATION_CHECK_ENV: &str = "STEPWISE_MUTATION_CHECK";
pub const TRACING_ENV: &str = "STEPWISE_TRACING";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid flow config: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub logging: bool,
    pub mutation_checking: bool,
    pub tracing: bool,
}

impl FlowConfig {
    /// Every layer enabled.
    pub fn all() -> Self {
        Self {
            logging: true,
            mutation_checking: true,
            tracing: true,
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str| lookup(name).map(|value| is_enabled(&value));
        let defaults = Self::default();
        Self {
            logging: flag(LOGGING_ENV).unwrap_or(defaults.logging),
            mutation_checking: flag(MUTATION_CHECK_ENV).unwrap_or(defaults.mutation_checking),
            tracing: flag(TRACING_ENV).unwrap_or(defaults.tracing),
        }
    }

    /// Layers in order: tracing, logging, mutation checking, then the base
    /// compiler.
    pub fn stack_with(
        &self,
        logger: Arc<dyn FlowLogger>,
        listener: Arc<dyn TraceEventListener>,
    ) -> CompilerStack {
        let mut stack = CompilerStack::new();
        if self.tracing {
            stack = stack.layer(TracingLayer::new(listener));
        }
        if self.logging {
            stack = stack.layer(LoggingLayer::new(logger));
        }
        if self.mutation_checking {
            stack = stack.layer(MutationCheckLayer);
        }
        stack
    }

    pub fn compiler_with(
        &self,
        logger: Arc<dyn FlowLogger>,
        listener: Arc<dyn TraceEventListener>,
    ) -> FlowCompiler {
        let compiler = FlowCompiler::with_stack(self.stack_with(logger, listener));
        tracing::debug!(config = ?self, "flow compiler configured");
        compiler
    }

    /// A compiler reporting through `tracing`.
    pub fn compiler(&self) -> FlowCompiler {
        self.compiler_with(Arc::new(TracingFlowLogger), Arc::new(TracingEventListener))
    }
}

fn is_enabled(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}
