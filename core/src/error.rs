use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The reason a step failed, as recorded in a scratchpad.
///
/// Operation errors are captured as data rather than propagated, so the same
/// reason may end up shared by many scratchpads derived from one another.
/// `Failure` is therefore a cheap, cloneable handle over the original
/// `anyhow::Error`.
#[derive(Clone)]
pub struct Failure(Arc<anyhow::Error>);

impl Failure {
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(error.into()))
    }

    /// Build a failure from a plain message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.0
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Follow retrieval errors back to the failure that started the chain.
    ///
    /// A step that reads a failed key fails itself with
    /// [`ScratchpadError::Failed`]; this unwraps those layers.
    pub fn root(&self) -> Failure {
        match self.downcast_ref::<ScratchpadError>() {
            Some(ScratchpadError::Failed { reason, .. }) => reason.root(),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        (**self.0).source()
    }
}

/// Errors raised by [`Scratchpad`](crate::Scratchpad) reads and writes.
///
/// Reading an absent key and reading a key that holds a recorded failure are
/// deliberately different variants: the first means the step never ran, the
/// second means it ran and failed.
#[derive(Debug, Clone, Error)]
pub enum ScratchpadError {
    #[error("no value has been written for key `{0}`")]
    Missing(String),
    #[error("key `{key}` holds a recorded failure: {reason}")]
    Failed { key: String, reason: Failure },
    #[error("key `{0}` holds a value, not a failure")]
    NotAFailure(String),
    #[error("cannot overwrite keys in a locked scratchpad: {}", .0.join(", "))]
    LockedOverwrite(Vec<String>),
    #[error("value under key `{key}` is not a `{expected}`")]
    TypeMismatch { key: String, expected: &'static str },
}

/// Errors that abort flow construction or a run.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    #[error(
        "branch arm `{condition}` provides `{actual}` but the default branch provides `{expected}`"
    )]
    BranchOutputMismatch {
        condition: String,
        expected: String,
        actual: String,
    },
    #[error("missing required keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),
    #[error(transparent)]
    Scratchpad(#[from] ScratchpadError),
    #[error("flow failed: {0}")]
    Failed(Failure),
    #[error("step `{step}` mutated existing scratchpad keys: {}", .keys.join(", "))]
    MutationDetected { step: String, keys: Vec<String> },
    #[error("condition `{condition}` could not be evaluated: {reason}")]
    ConditionFailed { condition: String, reason: Failure },
    #[error("background run did not complete: {0}")]
    Interrupted(String),
}

/// Error returned by an [`Operation`](crate::Operation).
///
/// `Failed` is recoverable: the compiler stores it under the step's provided
/// key. `Fatal` aborts the whole run.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error(transparent)]
    Failed(Failure),
    #[error(transparent)]
    Fatal(FlowError),
}

impl From<anyhow::Error> for OperationError {
    fn from(error: anyhow::Error) -> Self {
        OperationError::Failed(Failure::new(error))
    }
}

impl From<FlowError> for OperationError {
    fn from(error: FlowError) -> Self {
        OperationError::Fatal(error)
    }
}
