//! Conditions - Named Predicates over a Scratchpad
//!
//! A [`Condition`] picks an arm of a branch. It is a pure function of the
//! scratchpad it is tested against and carries a human description used in
//! trace maps, logs and error messages.

use crate::error::{Failure, FlowError};
use crate::key::Key;
use crate::scratchpad::Scratchpad;
use std::fmt;
use std::sync::Arc;

type Test = dyn Fn(&Scratchpad) -> Result<bool, FlowError> + Send + Sync;

#[derive(Clone)]
pub struct Condition {
    description: Arc<str>,
    test: Arc<Test>,
}

impl Condition {
    /// A condition from a fallible predicate.
    ///
    /// An error from the predicate aborts the run with
    /// [`FlowError::ConditionFailed`]; conditions have no key to record a
    /// failure under.
    pub fn new<F>(description: impl Into<String>, test: F) -> Self
    where
        F: Fn(&Scratchpad) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        let description: Arc<str> = Arc::from(description.into());
        let label = Arc::clone(&description);
        Self {
            description,
            test: Arc::new(move |scratchpad: &Scratchpad| {
                test(scratchpad).map_err(|err| FlowError::ConditionFailed {
                    condition: label.to_string(),
                    reason: Failure::new(err),
                })
            }),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn test(&self, scratchpad: &Scratchpad) -> Result<bool, FlowError> {
        (self.test)(scratchpad)
    }

    /// Wrap evaluation, keeping the description.
    ///
    /// `wrapper` receives the scratchpad and the original condition; it
    /// decides when (and whether) to call [`Condition::test`] on it.
    pub fn wrap<F>(&self, wrapper: F) -> Self
    where
        F: Fn(&Scratchpad, &Condition) -> Result<bool, FlowError> + Send + Sync + 'static,
    {
        let inner = self.clone();
        Self {
            description: Arc::clone(&self.description),
            test: Arc::new(move |scratchpad: &Scratchpad| wrapper(scratchpad, &inner)),
        }
    }

    pub fn always() -> Self {
        Self::new("Always", |_| Ok(true))
    }

    /// True when `key` holds a value. Absent keys are an error.
    pub fn is_successful<T: 'static>(key: &Key<T>) -> Self {
        let key = key.clone();
        Self::new(format!("{} succeeded", key.name()), move |scratchpad| {
            Ok(scratchpad.is_successful(&key)?)
        })
    }

    /// True when `key` holds a recorded failure. Absent keys are an error.
    pub fn is_failure<T: 'static>(key: &Key<T>) -> Self {
        let key = key.clone();
        Self::new(format!("{} failed", key.name()), move |scratchpad| {
            Ok(!scratchpad.is_successful(&key)?)
        })
    }

    pub fn key_equals<T>(key: &Key<T>, expected: T) -> Self
    where
        T: PartialEq + fmt::Debug + Send + Sync + 'static,
    {
        let key = key.clone();
        Self::new(format!("{} == {:?}", key.name(), expected), move |scratchpad| {
            Ok(*scratchpad.get(&key)? == expected)
        })
    }

    pub fn key_matches<T, F>(key: &Key<T>, description: impl Into<String>, predicate: F) -> Self
    where
        T: 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let key = key.clone();
        Self::new(description, move |scratchpad| {
            Ok(predicate(scratchpad.get(&key)?))
        })
    }

    /// Both conditions hold. `other` is not evaluated when `self` is false.
    pub fn and(&self, other: &Condition) -> Self {
        let (left, right) = (self.clone(), other.clone());
        Self {
            description: Arc::from(format!("({}) and ({})", left.description, right.description)),
            test: Arc::new(move |scratchpad: &Scratchpad| {
                Ok(left.test(scratchpad)? && right.test(scratchpad)?)
            }),
        }
    }

    /// Either condition holds. `other` is not evaluated when `self` is true.
    pub fn or(&self, other: &Condition) -> Self {
        let (left, right) = (self.clone(), other.clone());
        Self {
            description: Arc::from(format!("({}) or ({})", left.description, right.description)),
            test: Arc::new(move |scratchpad: &Scratchpad| {
                Ok(left.test(scratchpad)? || right.test(scratchpad)?)
            }),
        }
    }

    pub fn negate(&self) -> Self {
        let inner = self.clone();
        Self {
            description: Arc::from(format!("not ({})", inner.description)),
            test: Arc::new(move |scratchpad: &Scratchpad| Ok(!inner.test(scratchpad)?)),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Condition").field(&self.description).finish()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_failure_conditions() {
        let payment = Key::<String>::named("paymentResult");
        let failed = Scratchpad::from_values([payment.of_failure(anyhow::anyhow!("declined"))]);
        let paid = Scratchpad::from_values([payment.of("ref-1".to_string())]);

        let on_failure = Condition::is_failure(&payment);
        assert_eq!(on_failure.description(), "paymentResult failed");
        assert!(on_failure.test(&failed).unwrap());
        assert!(!on_failure.test(&paid).unwrap());

        assert!(Condition::is_successful(&payment).test(&paid).unwrap());
    }

    #[test]
    fn test_unreadable_key_fails_condition() {
        let flag = Key::<bool>::named("flag");
        let err = Condition::key_equals(&flag, true)
            .test(&Scratchpad::new())
            .unwrap_err();
        assert!(matches!(err, FlowError::ConditionFailed { ref condition, .. } if condition == "flag == true"));
    }

    #[test]
    fn test_and_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = {
            let calls = calls.clone();
            Condition::new("counted", move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            })
        };
        let never = Condition::new("never", |_| Ok(false));

        assert!(!never.and(&counted).test(&Scratchpad::new()).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(never.or(&counted).test(&Scratchpad::new()).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(never.negate().description(), "not (never)");
    }

    #[test]
    fn test_wrap_keeps_description() {
        let seen = Arc::new(AtomicUsize::new(0));
        let wrapped = {
            let seen = seen.clone();
            Condition::always().wrap(move |scratchpad, inner| {
                seen.fetch_add(1, Ordering::SeqCst);
                inner.test(scratchpad)
            })
        };
        assert_eq!(wrapped.description(), "Always");
        assert!(wrapped.test(&Scratchpad::new()).unwrap());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
