use std::sync::Arc;
use stepwise::core::AnyKey;
use stepwise::prelude::*;
use stepwise::runtime::{FlowLogger, TracingEventListener};

#[derive(Default)]
struct ConditionLog(parking_lot::Mutex<Vec<String>>);

impl FlowLogger for ConditionLog {
    fn operation_started(&self, _: RunId, _: &str, _: &AnyKey) {}

    fn operation_completed(&self, _: RunId, _: &str, _: &AnyKey) {}

    fn operation_failed(&self, _: RunId, _: &str, _: &AnyKey, _: &Failure) {}

    fn operation_aborted(&self, _: RunId, _: &str, _: &AnyKey, _: &FlowError) {}

    fn condition_started(&self, condition: &str) {
        self.0.lock().push(format!("{condition}?"));
    }

    fn condition_completed(&self, condition: &str, result: bool) {
        self.0.lock().push(format!("{condition}={result}"));
    }

    fn condition_failed(&self, condition: &str, _: &FlowError) {
        self.0.lock().push(format!("{condition}!"));
    }
}

#[test]
fn conditions_are_logged_under_the_tracing_layer() {
    let flag = Key::<bool>::named("flag");
    let out = Key::<String>::named("out");
    let yes = Flow::single("yes", [], &out, |_| Ok("yes".to_string()));
    let no = Flow::single("no", [], &out, |_| Ok("no".to_string()));
    let flow = Flow::branch(Condition::key_equals(&flag, true), &yes)
        .otherwise(&no)
        .unwrap();

    let log = Arc::new(ConditionLog::default());
    let compiled = FlowConfig::all()
        .compiler_with(log.clone(), Arc::new(TracingEventListener))
        .compile(&flow);

    assert_eq!(compiled.run(Scratchpad::from_values([flag.of(false)])).unwrap(), "no");
    assert_eq!(
        *log.0.lock(),
        vec!["flag == true?".to_string(), "flag == true=false".to_string()]
    );
}
