//! Execution - Running a Compiled Flow
//!
//! [`CompiledFlow`] checks the initial scratchpad against the flow's required
//! keys, locks it, runs the compiled action inside a `Flow` span and hands
//! back either the typed result or the whole final scratchpad.
//!
//! Runs are synchronous. [`CompiledFlow::run_blocking`] and
//! [`CompiledFlow::spawn_with_callback`] move a run onto tokio's blocking
//! pool for callers already inside an async runtime.

use std::fmt;
use stepwise_core::{
    Action, ActionResult, Flow, FlowError, Key, KeySet, RunId, Scratchpad, ScratchpadError,
    StepId, TraceMap, key_names,
};
use tokio::task::JoinHandle;

pub struct CompiledFlow<T> {
    action: Action,
    flow_id: StepId,
    required: KeySet,
    output: Key<T>,
    trace_map: TraceMap,
}

impl<T> CompiledFlow<T> {
    pub(crate) fn new(action: Action, flow: &Flow<T>, trace_map: TraceMap) -> Self {
        Self {
            action,
            flow_id: flow.id(),
            required: flow.required_keys().clone(),
            output: flow.output_key(),
            trace_map,
        }
    }

    pub fn required_keys(&self) -> &KeySet {
        &self.required
    }

    pub fn output_key(&self) -> &Key<T> {
        &self.output
    }

    pub fn trace_map(&self) -> &TraceMap {
        &self.trace_map
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Run and return the final scratchpad, failures included.
    pub fn run_to_scratchpad(&self, initial: Scratchpad) -> ActionResult {
        self.execute(RunId::new(), initial)
    }

    pub fn run_to_scratchpad_with_id(&self, run_id: RunId, initial: Scratchpad) -> ActionResult {
        self.execute(run_id, initial)
    }

    fn execute(&self, run_id: RunId, initial: Scratchpad) -> ActionResult {
        let missing = key_names(self.required.iter().filter(|key| !initial.contains(*key)));
        if !missing.is_empty() {
            tracing::warn!(
                stepwise.run_id = %run_id,
                stepwise.flow = %self.flow_id,
                missing = ?missing,
                "initial scratchpad lacks required keys"
            );
            return Err(FlowError::MissingKeys(missing));
        }

        let span = tracing::info_span!(
            "Flow",
            stepwise.run_id = %run_id,
            stepwise.flow = %self.flow_id
        );
        let _entered = span.enter();

        tracing::debug!(keys = initial.len(), "run started");
        let result = self.action.run(run_id, initial.locked());
        match &result {
            Ok(scratchpad) => tracing::debug!(keys = scratchpad.len(), "run completed"),
            Err(err) => tracing::warn!(error = %err, "run aborted"),
        }
        result
    }
}

impl<T: Clone + 'static> CompiledFlow<T> {
    /// Run and return the value under the flow's provided key.
    ///
    /// A failure recorded under that key becomes [`FlowError::Failed`].
    pub fn run(&self, initial: Scratchpad) -> Result<T, FlowError> {
        self.run_with_id(RunId::new(), initial)
    }

    pub fn run_with_id(&self, run_id: RunId, initial: Scratchpad) -> Result<T, FlowError> {
        let scratchpad = self.execute(run_id, initial)?;
        match scratchpad.get(&self.output) {
            Ok(value) => Ok(value.clone()),
            Err(ScratchpadError::Failed { reason, .. }) => Err(FlowError::Failed(reason)),
            Err(err) => Err(err.into()),
        }
    }
}

impl<T: Clone + Send + 'static> CompiledFlow<T> {
    /// [`run`](Self::run) on tokio's blocking pool.
    pub async fn run_blocking(&self, initial: Scratchpad) -> Result<T, FlowError> {
        let flow = self.clone();
        tokio::task::spawn_blocking(move || flow.run(initial))
            .await
            .map_err(|err| FlowError::Interrupted(err.to_string()))?
    }

    /// Start a run on tokio's blocking pool and pass its result to
    /// `callback` on the same thread.
    pub fn spawn_with_callback<F>(&self, initial: Scratchpad, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<T, FlowError>) + Send + 'static,
    {
        let flow = self.clone();
        tokio::task::spawn_blocking(move || callback(flow.run(initial)))
    }
}

impl<T> Clone for CompiledFlow<T> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            flow_id: self.flow_id,
            required: self.required.clone(),
            output: self.output.clone(),
            trace_map: self.trace_map.clone(),
        }
    }
}

impl<T> fmt::Debug for CompiledFlow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFlow")
            .field("flow", &self.flow_id)
            .field("requires", &key_names(&self.required))
            .field("provides", &self.output.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::FlowCompiler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, mpsc};
    use stepwise_core::{Condition, step};

    #[test]
    fn test_missing_keys_listed_before_anything_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (a, b, c) = (
            Key::<u32>::named("alpha"),
            Key::<u32>::named("beta"),
            Key::<u32>::named("gamma"),
        );
        let out = Key::<u32>::named("sum");
        let flow = {
            let calls = calls.clone();
            step::from3("sum", &a, &b, &c, &out, move |a: &u32, b: &u32, c: &u32| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(a + b + c)
            })
        };

        let compiled = FlowCompiler::new().compile(&flow);
        let err = compiled
            .run(Scratchpad::from_values([b.of(1)]))
            .unwrap_err();
        assert!(matches!(err, FlowError::MissingKeys(ref keys) if keys == &["alpha", "gamma"]));
        assert_eq!(err.to_string(), "missing required keys: alpha, gamma");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_recorded_failure_becomes_error() {
        let out = Key::<u32>::named("out");
        let flow = Flow::single("fails", [], &out, |_| Err(anyhow::anyhow!("declined")));
        let compiled = FlowCompiler::new().compile(&flow);

        match compiled.run(Scratchpad::new()) {
            Err(FlowError::Failed(reason)) => assert_eq!(reason.to_string(), "declined"),
            other => panic!("unexpected {other:?}"),
        }

        let pad = compiled.run_to_scratchpad(Scratchpad::new()).unwrap();
        assert!(pad.is_locked());
        assert!(!pad.is_successful(&out).unwrap());
    }

    #[test]
    fn test_writing_an_initial_key_is_rejected() {
        let k = Key::<u32>::named("K");
        let flow = Flow::single("overwrite", [], &k, |_| Ok(2));
        let err = FlowCompiler::new()
            .compile(&flow)
            .run(Scratchpad::from_values([k.of(1)]))
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Scratchpad(ScratchpadError::LockedOverwrite(ref keys)) if keys == &["K"]
        ));
    }

    #[test]
    fn test_branch_runs_first_true_arm_only() {
        let tested = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let out = Key::<&'static str>::named("out");
        let cond = |name: &'static str, value: bool| {
            let tested = tested.clone();
            Condition::new(name, move |_| {
                tested.lock().push(name);
                Ok(value)
            })
        };
        let arm = |name: &'static str| Flow::single(name, [], &out, move |_| Ok(name));

        let flow = Flow::branch(cond("c1", false), &arm("a1"))
            .or_if(cond("c2", true), &arm("a2"))
            .or_if(cond("c3", true), &arm("a3"))
            .otherwise(&arm("default"))
            .unwrap();
        let compiled = FlowCompiler::new().compile(&flow);

        assert_eq!(compiled.run(Scratchpad::new()).unwrap(), "a2");
        assert_eq!(*tested.lock(), vec!["c1", "c2"]);

        tested.lock().clear();
        let first = Flow::branch(cond("c1", true), &arm("a1"))
            .or_if(cond("c2", true), &arm("a2"))
            .otherwise(&arm("default"))
            .unwrap();
        assert_eq!(
            FlowCompiler::new().compile(&first).run(Scratchpad::new()).unwrap(),
            "a1"
        );
        assert_eq!(*tested.lock(), vec!["c1"]);

        let none = Flow::branch(cond("n1", false), &arm("a1"))
            .otherwise(&arm("default"))
            .unwrap();
        assert_eq!(
            FlowCompiler::new().compile(&none).run(Scratchpad::new()).unwrap(),
            "default"
        );
    }

    #[test]
    fn test_compiled_flow_is_shared_across_threads() {
        let x = Key::<u64>::named("x");
        let squared = Key::<u64>::named("squared");
        let flow = step::from1("square", &x, &squared, |x: &u64| Ok(x * x));
        let compiled = Arc::new(FlowCompiler::new().compile(&flow));

        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let compiled = compiled.clone();
                let x = x.clone();
                std::thread::spawn(move || compiled.run(Scratchpad::from_values([x.of(i)])))
            })
            .collect();
        let results: Vec<u64> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();
        assert_eq!(results, vec![0, 1, 4, 9, 16, 25, 36, 49]);
    }

    #[tokio::test]
    async fn test_run_blocking_and_callback() {
        let name = Key::<String>::named("name");
        let greeting = Key::<String>::named("greeting");
        let flow = step::from1("greet", &name, &greeting, |n: &String| Ok(format!("hi {n}")));
        let compiled = FlowCompiler::new().compile(&flow);

        let result = compiled
            .run_blocking(Scratchpad::from_values([name.of("Fred".into())]))
            .await
            .unwrap();
        assert_eq!(result, "hi Fred");

        let (tx, rx) = mpsc::channel();
        compiled
            .spawn_with_callback(Scratchpad::new(), move |result| {
                let _ = tx.send(result.is_err());
            })
            .await
            .unwrap();
        assert!(rx.recv().unwrap());
    }
}
