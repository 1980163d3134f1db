//! Step adapters
//!
//! Build single-step flows from plain functions of typed values. Each input
//! key is read from the scratchpad before the function runs; a missing or
//! failed input fails the step without calling it.
//!
//! ```rust,ignore
//! let greet = step::from1("greet", &user_name, &greeting, |name: &String| {
//!     Ok(format!("Hello, {name}"))
//! });
//! ```

use crate::flow::Flow;
use crate::key::Key;
use crate::value::ScratchValue;

pub fn from0<T, F>(name: impl Into<String>, output: &Key<T>, f: F) -> Flow<T>
where
    T: ScratchValue,
    F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
{
    Flow::single(name, [], output, move |_| f())
}

pub fn from1<A, T, F>(name: impl Into<String>, a: &Key<A>, output: &Key<T>, f: F) -> Flow<T>
where
    A: 'static,
    T: ScratchValue,
    F: Fn(&A) -> anyhow::Result<T> + Send + Sync + 'static,
{
    let a = a.clone();
    Flow::single(name, [a.erased()], output, move |pad| f(pad.get(&a)?))
}

pub fn from2<A, B, T, F>(
    name: impl Into<String>,
    a: &Key<A>,
    b: &Key<B>,
    output: &Key<T>,
    f: F,
) -> Flow<T>
where
    A: 'static,
    B: 'static,
    T: ScratchValue,
    F: Fn(&A, &B) -> anyhow::Result<T> + Send + Sync + 'static,
{
    let (a, b) = (a.clone(), b.clone());
    Flow::single(name, [a.erased(), b.erased()], output, move |pad| {
        f(pad.get(&a)?, pad.get(&b)?)
    })
}

pub fn from3<A, B, C, T, F>(
    name: impl Into<String>,
    a: &Key<A>,
    b: &Key<B>,
    c: &Key<C>,
    output: &Key<T>,
    f: F,
) -> Flow<T>
where
    A: 'static,
    B: 'static,
    C: 'static,
    T: ScratchValue,
    F: Fn(&A, &B, &C) -> anyhow::Result<T> + Send + Sync + 'static,
{
    let (a, b, c) = (a.clone(), b.clone(), c.clone());
    Flow::single(name, [a.erased(), b.erased(), c.erased()], output, move |pad| {
        f(pad.get(&a)?, pad.get(&b)?, pad.get(&c)?)
    })
}

#[allow(clippy::too_many_arguments)]
pub fn from4<A, B, C, D, T, F>(
    name: impl Into<String>,
    a: &Key<A>,
    b: &Key<B>,
    c: &Key<C>,
    d: &Key<D>,
    output: &Key<T>,
    f: F,
) -> Flow<T>
where
    A: 'static,
    B: 'static,
    C: 'static,
    D: 'static,
    T: ScratchValue,
    F: Fn(&A, &B, &C, &D) -> anyhow::Result<T> + Send + Sync + 'static,
{
    let (a, b, c, d) = (a.clone(), b.clone(), c.clone(), d.clone());
    Flow::single(
        name,
        [a.erased(), b.erased(), c.erased(), d.erased()],
        output,
        move |pad| f(pad.get(&a)?, pad.get(&b)?, pad.get(&c)?, pad.get(&d)?),
    )
}
