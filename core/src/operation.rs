use crate::error::{Failure, OperationError};
use crate::scratchpad::Scratchpad;
use crate::value::{ScratchValue, StoredValue};
use std::marker::PhantomData;
use std::sync::Arc;

/// The contract for a step's work: read the scratchpad, produce one value.
///
/// Operations must treat existing scratchpad entries as read-only. Mutation
/// checking can enforce that for values with interior mutability.
pub trait Operation: Send + Sync {
    fn name(&self) -> &str;

    fn invoke(&self, scratchpad: &Scratchpad) -> Result<StoredValue, OperationError>;
}

/// An [`Operation`] backed by a closure.
pub struct FnOperation<T, F> {
    name: String,
    f: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> FnOperation<T, F>
where
    T: ScratchValue,
    F: Fn(&Scratchpad) -> anyhow::Result<T> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            _marker: PhantomData,
        }
    }
}

impl<T, F> Operation for FnOperation<T, F>
where
    T: ScratchValue,
    F: Fn(&Scratchpad) -> anyhow::Result<T> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, scratchpad: &Scratchpad) -> Result<StoredValue, OperationError> {
        match (self.f)(scratchpad) {
            Ok(value) => Ok(Arc::new(value)),
            Err(err) => Err(OperationError::Failed(Failure::new(err))),
        }
    }
}

impl<T, F> std::fmt::Debug for FnOperation<T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnOperation")
            .field("name", &self.name)
            .finish()
    }
}
