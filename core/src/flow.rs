//! Flow - The Composition Tree
//!
//! A [`Flow<T>`] is an immutable tree of three node kinds:
//!
//! * **Single**: one named [`Operation`] writing one key
//! * **Sequence**: items run in order, built with [`Flow::then`]
//! * **Branch**: a default plus conditional arms, built with
//!   [`Flow::or_if`], [`Flow::branch`] or [`Flow::branch_on_result`]
//!
//! Every node knows the keys it needs from outside (`required_keys`) and the
//! one key it provides. Both are computed once, at construction, so a flow
//! can be checked against a scratchpad before anything runs.
//!
//! Flows are cheap to clone and safe to share: the same flow can be compiled
//! and executed from any number of threads.

use crate::condition::Condition;
use crate::error::FlowError;
use crate::key::{AnyKey, Key, KeyId, KeySet, key_names};
use crate::operation::{FnOperation, Operation};
use crate::scratchpad::Scratchpad;
use crate::value::ScratchValue;
use crate::visitor::{Describer, FlowVisitor};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of one flow node, used to correlate logs and trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(Uuid);

impl StepId {
    fn fresh() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derived metadata shared by every node kind.
#[derive(Debug, Clone)]
pub struct StepHeader {
    id: StepId,
    required: KeySet,
    provided: AnyKey,
}

impl StepHeader {
    fn new(required: KeySet, provided: AnyKey) -> Self {
        Self {
            id: StepId::fresh(),
            required,
            provided,
        }
    }

    pub fn id(&self) -> StepId {
        self.id
    }

    pub fn required_keys(&self) -> &KeySet {
        &self.required
    }

    pub fn provided_key(&self) -> &AnyKey {
        &self.provided
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowKind {
    Single,
    Sequence,
    Branch,
}

enum FlowNode {
    Single {
        header: StepHeader,
        operation: Arc<dyn Operation>,
    },
    Sequence {
        header: StepHeader,
        items: Vec<Arc<FlowNode>>,
    },
    Branch {
        header: StepHeader,
        default: Arc<FlowNode>,
        arms: Vec<(Condition, Arc<FlowNode>)>,
    },
}

impl FlowNode {
    fn header(&self) -> &StepHeader {
        match self {
            FlowNode::Single { header, .. }
            | FlowNode::Sequence { header, .. }
            | FlowNode::Branch { header, .. } => header,
        }
    }

    fn kind(&self) -> FlowKind {
        match self {
            FlowNode::Single { .. } => FlowKind::Single,
            FlowNode::Sequence { .. } => FlowKind::Sequence,
            FlowNode::Branch { .. } => FlowKind::Branch,
        }
    }

    fn accept<V: FlowVisitor + ?Sized>(&self, visitor: &V) -> V::Output {
        match self {
            FlowNode::Single { header, operation } => {
                visitor.visit_single(header, Arc::clone(operation))
            }
            FlowNode::Sequence { header, items } => {
                let items = items.iter().map(|item| item.accept(visitor)).collect();
                visitor.visit_sequence(header, items)
            }
            FlowNode::Branch {
                header,
                default,
                arms,
            } => {
                let default = default.accept(visitor);
                let arms = arms
                    .iter()
                    .map(|(condition, arm)| {
                        (visitor.visit_condition(condition.clone()), arm.accept(visitor))
                    })
                    .collect();
                visitor.visit_branch(header, default, arms)
            }
        }
    }

    /// The items this node contributes to an enclosing sequence.
    fn flattened(node: &Arc<FlowNode>) -> Vec<Arc<FlowNode>> {
        match &**node {
            FlowNode::Sequence { items, .. } => items.clone(),
            _ => vec![Arc::clone(node)],
        }
    }

    fn sequence(items: Vec<Arc<FlowNode>>, provided: AnyKey) -> FlowNode {
        let mut required = KeySet::new();
        let mut provided_so_far: AHashSet<KeyId> = AHashSet::new();
        for item in &items {
            let header = item.header();
            required.extend(
                header
                    .required
                    .iter()
                    .filter(|key| !provided_so_far.contains(&key.id()))
                    .cloned(),
            );
            provided_so_far.insert(header.provided.id());
        }

        FlowNode::Sequence {
            header: StepHeader::new(required, provided),
            items,
        }
    }

    fn branch(
        default: Arc<FlowNode>,
        arms: Vec<(Condition, Arc<FlowNode>)>,
    ) -> Result<FlowNode, FlowError> {
        let expected = default.header().provided.clone();
        let mut required = default.header().required.clone();

        for (condition, arm) in &arms {
            let actual = &arm.header().provided;
            if *actual != expected {
                tracing::debug!(
                    condition = condition.description(),
                    expected = expected.name(),
                    actual = actual.name(),
                    "rejected branch arm with mismatched output"
                );
                return Err(FlowError::BranchOutputMismatch {
                    condition: condition.description().to_string(),
                    expected: expected.name().to_string(),
                    actual: actual.name().to_string(),
                });
            }
            required.extend(arm.header().required.iter().cloned());
        }

        Ok(FlowNode::Branch {
            header: StepHeader::new(required, expected),
            default,
            arms,
        })
    }
}

/// An immutable, shareable flow producing a value of type `T`.
pub struct Flow<T> {
    node: Arc<FlowNode>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Flow<T> {
    fn from_node(node: FlowNode) -> Self {
        Self {
            node: Arc::new(node),
            _marker: PhantomData,
        }
    }

    /// A single step running `f`.
    ///
    /// `inputs` must name every key `f` reads; they become the step's
    /// required keys.
    ///
    /// ```rust,ignore
    /// let greet = Flow::single("greet", [name.erased()], &greeting, {
    ///     let name = name.clone();
    ///     move |pad| Ok(format!("Hello, {}", pad.get(&name)?))
    /// });
    /// ```
    pub fn single<F>(
        name: impl Into<String>,
        inputs: impl IntoIterator<Item = AnyKey>,
        output: &Key<T>,
        f: F,
    ) -> Self
    where
        T: ScratchValue,
        F: Fn(&Scratchpad) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::from_operation(Arc::new(FnOperation::new(name, f)), inputs, output)
    }

    /// A single step around a hand-written [`Operation`].
    pub fn from_operation(
        operation: Arc<dyn Operation>,
        inputs: impl IntoIterator<Item = AnyKey>,
        output: &Key<T>,
    ) -> Self {
        let header = StepHeader::new(inputs.into_iter().collect(), output.erased());
        Self::from_node(FlowNode::Single { header, operation })
    }

    pub fn id(&self) -> StepId {
        self.node.header().id
    }

    pub fn kind(&self) -> FlowKind {
        self.node.kind()
    }

    /// Keys that must be in the scratchpad before this flow runs.
    pub fn required_keys(&self) -> &KeySet {
        &self.node.header().required
    }

    pub fn provided_key(&self) -> &AnyKey {
        &self.node.header().provided
    }

    /// The typed key this flow writes its result to.
    pub fn output_key(&self) -> Key<T> {
        Key::from_erased(self.provided_key().clone())
    }

    /// Run `next` after this flow.
    ///
    /// Sequences on either side are spliced in, so chains stay flat. Keys
    /// this flow provides are not counted as requirements of `next`.
    pub fn then<U>(&self, next: &Flow<U>) -> Flow<U> {
        let mut items = FlowNode::flattened(&self.node);
        items.extend(FlowNode::flattened(&next.node));
        Flow::from_node(FlowNode::sequence(items, next.provided_key().clone()))
    }

    /// Run `flow` instead of this one when `condition` holds.
    ///
    /// This flow becomes the default branch. Called on a branch, the arm is
    /// appended to it rather than nesting a new branch, and arms are tried in
    /// the order they were added.
    pub fn or_if(&self, condition: Condition, flow: &Flow<T>) -> Result<Flow<T>, FlowError> {
        let node = match &*self.node {
            FlowNode::Branch { default, arms, .. } => {
                let mut arms = arms.clone();
                arms.push((condition, Arc::clone(&flow.node)));
                FlowNode::branch(Arc::clone(default), arms)?
            }
            _ => FlowNode::branch(
                Arc::clone(&self.node),
                vec![(condition, Arc::clone(&flow.node))],
            )?,
        };
        Ok(Flow::from_node(node))
    }

    /// Start a branch whose first arm is `flow` under `condition`.
    pub fn branch(condition: Condition, flow: &Flow<T>) -> BranchBuilder<T> {
        BranchBuilder {
            arms: vec![(condition, flow.clone())],
        }
    }

    /// Branch on whether this flow's own result is a recorded failure.
    pub fn branch_on_result(&self) -> ResultBranch<T> {
        ResultBranch {
            source: self.clone(),
        }
    }

    pub fn visit<V: FlowVisitor + ?Sized>(&self, visitor: &V) -> V::Output {
        self.node.accept(visitor)
    }

    pub fn describe(&self) -> String {
        self.visit(&Describer)
    }
}

impl<T> Clone for Flow<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Flow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("requires", &key_names(self.required_keys()))
            .field("provides", &self.provided_key().name())
            .finish()
    }
}

/// Collects conditional arms until [`otherwise`](BranchBuilder::otherwise)
/// supplies the default.
pub struct BranchBuilder<T> {
    arms: Vec<(Condition, Flow<T>)>,
}

impl<T> BranchBuilder<T> {
    pub fn or_if(mut self, condition: Condition, flow: &Flow<T>) -> Self {
        self.arms.push((condition, flow.clone()));
        self
    }

    /// Finish the branch. Fails if any arm provides a different key than
    /// `default`.
    pub fn otherwise(self, default: &Flow<T>) -> Result<Flow<T>, FlowError> {
        let arms = self
            .arms
            .into_iter()
            .map(|(condition, flow)| (condition, flow.node))
            .collect();
        let node = FlowNode::branch(Arc::clone(&default.node), arms)?;
        Ok(Flow::from_node(node))
    }
}

/// First half of [`Flow::branch_on_result`].
pub struct ResultBranch<T> {
    source: Flow<T>,
}

impl<T> ResultBranch<T> {
    pub fn on_failure<U>(self, flow: &Flow<U>) -> FailureBranch<T, U> {
        FailureBranch {
            source: self.source,
            on_failure: flow.clone(),
        }
    }
}

/// Second half of [`Flow::branch_on_result`].
pub struct FailureBranch<T, U> {
    source: Flow<T>,
    on_failure: Flow<U>,
}

impl<T: 'static, U> FailureBranch<T, U> {
    /// `source.then(if source failed: on_failure otherwise success)`.
    pub fn otherwise(self, success: &Flow<U>) -> Result<Flow<U>, FlowError> {
        let failed = Condition::is_failure(&self.source.output_key());
        let branch = Flow::branch(failed, &self.on_failure).otherwise(success)?;
        Ok(self.source.then(&branch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step<T: ScratchValue + Default>(
        name: &str,
        inputs: &[AnyKey],
        output: &Key<T>,
    ) -> Flow<T> {
        Flow::single(name, inputs.iter().cloned(), output, |_| Ok(T::default()))
    }

    fn names(keys: &KeySet) -> Vec<String> {
        key_names(keys)
    }

    #[test]
    fn test_sequence_required_keys_skip_upstream_outputs() {
        let (x, y, z) = (
            Key::<u32>::named("x"),
            Key::<u32>::named("y"),
            Key::<u32>::named("z"),
        );
        let (pa, pb, pc) = (
            Key::<u32>::named("a_out"),
            Key::<u32>::named("b_out"),
            Key::<u32>::named("c_out"),
        );

        let a = step("a", &[x.erased()], &pa);
        let b = step("b", &[pa.erased(), y.erased()], &pb);
        let c = step("c", &[pa.erased(), pb.erased(), z.erased()], &pc);

        let flow = a.then(&b).then(&c);
        assert_eq!(names(flow.required_keys()), vec!["x", "y", "z"]);
        assert_eq!(flow.provided_key(), &pc.erased());
    }

    #[test]
    fn test_sequence_counts_keys_read_before_they_are_provided() {
        let shared = Key::<u32>::named("shared");
        let out = Key::<u32>::named("out");

        // `b` reads `shared` before `a2` provides it, so it stays external.
        let b = step("b", &[shared.erased()], &out);
        let a2 = step("a2", &[], &shared);
        let flow = b.then(&a2);
        assert_eq!(names(flow.required_keys()), vec!["shared"]);
    }

    #[test]
    fn test_then_flattens_both_sides() {
        let k: Vec<Key<u32>> = (0..4).map(|i| Key::named(format!("k{i}"))).collect();
        let s: Vec<Flow<u32>> = k.iter().map(|key| step("s", &[], key)).collect();

        let left = s[0].then(&s[1]);
        let right = s[2].then(&s[3]);
        let joined = left.then(&right);

        let depth = joined.visit(&ShapeVisitor);
        assert_eq!(depth, "Seq[S,S,S,S]");
    }

    #[test]
    fn test_branch_mismatch_fails_at_construction() {
        let out = Key::<String>::named("out");
        let other = Key::<String>::named("other");
        let default = step("default", &[], &out);
        let arm = step("arm", &[], &other);

        let err = Flow::branch(Condition::new("isSpecial", |_| Ok(true)), &arm)
            .otherwise(&default)
            .unwrap_err();
        match err {
            FlowError::BranchOutputMismatch {
                condition,
                expected,
                actual,
            } => {
                assert_eq!(condition, "isSpecial");
                assert_eq!(expected, "out");
                assert_eq!(actual, "other");
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(default.or_if(Condition::always(), &arm).is_err());
    }

    #[test]
    fn test_or_if_appends_to_existing_branch() {
        let input_a = Key::<u32>::named("a");
        let input_b = Key::<u32>::named("b");
        let input_c = Key::<u32>::named("c");
        let out = Key::<u32>::named("out");

        let default = step("default", &[input_a.erased()], &out);
        let first = step("first", &[input_b.erased()], &out);
        let second = step("second", &[input_c.erased()], &out);

        let flow = default
            .or_if(Condition::new("c1", |_| Ok(false)), &first)
            .unwrap()
            .or_if(Condition::new("c2", |_| Ok(false)), &second)
            .unwrap();

        assert_eq!(flow.kind(), FlowKind::Branch);
        assert_eq!(flow.visit(&ShapeVisitor), "Br[S;c1:S,c2:S]");
        assert_eq!(names(flow.required_keys()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_branch_on_result_requires_only_external_keys() {
        let billing = Key::<String>::named("billingDetails");
        let amount = Key::<u64>::named("paymentAmount");
        let customer = Key::<String>::named("customerId");
        let basket = Key::<Vec<String>>::named("productBasket");
        let payment = Key::<String>::named("paymentResult");
        let released = Key::<bool>::named("stockReleased");
        let reference = Key::<String>::named("paymentReference");
        let status = Key::<String>::named("orderStatus");

        let make_payment = step("makePayment", &[billing.erased(), amount.erased()], &payment);
        let release_stock = step("releaseStock", &[basket.erased()], &released);
        let payment_failed = step(
            "paymentFailed",
            &[customer.erased(), payment.erased(), released.erased()],
            &status,
        );
        let place_order = step(
            "placeOrder",
            &[customer.erased(), basket.erased(), payment.erased()],
            &reference,
        );
        let success = step("success", &[customer.erased(), reference.erased()], &status);

        let flow = make_payment
            .branch_on_result()
            .on_failure(&release_stock.then(&payment_failed))
            .otherwise(&place_order.then(&success))
            .unwrap();

        assert_eq!(
            names(flow.required_keys()),
            vec!["billingDetails", "customerId", "paymentAmount", "productBasket"]
        );
        assert_eq!(flow.provided_key(), &status.erased());
        assert_eq!(
            flow.describe(),
            "makePayment then (if paymentResult failed: releaseStock then paymentFailed \
             otherwise placeOrder then success)"
        );
    }

    #[test]
    fn test_every_node_gets_its_own_id() {
        let out = Key::<u32>::named("out");
        let a = step("a", &[], &out);
        let b = step("b", &[], &out);
        let seq = a.then(&b);
        assert_ne!(a.id(), b.id());
        assert_ne!(seq.id(), a.id());
        assert_eq!(seq.clone().id(), seq.id());
    }

    /// Compact structural rendering for assertions.
    struct ShapeVisitor;

    impl FlowVisitor for ShapeVisitor {
        type Output = String;

        fn visit_single(&self, _: &StepHeader, _: Arc<dyn Operation>) -> String {
            "S".into()
        }

        fn visit_sequence(&self, _: &StepHeader, items: Vec<String>) -> String {
            format!("Seq[{}]", items.join(","))
        }

        fn visit_branch(
            &self,
            _: &StepHeader,
            default: String,
            arms: Vec<(Condition, String)>,
        ) -> String {
            let arms: Vec<String> = arms
                .into_iter()
                .map(|(c, a)| format!("{}:{}", c.description(), a))
                .collect();
            format!("Br[{};{}]", default, arms.join(","))
        }

        fn visit_condition(&self, condition: Condition) -> Condition {
            condition
        }
    }
}
