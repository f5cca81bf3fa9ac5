//! Combinators over resources of any value type.
//!
//! Values are combined at the query instant. A combinator whose input is still varying
//! (has [Dynamics::Linear] dynamics) cannot know how its own output will evolve, so its answer
//! expires immediately.

use crate::Time;
use crate::internal::clock::epoch_to_duration;
use crate::public::activity::{Activity, TaskContext, TaskResult};
use crate::public::branch::Branch;
use crate::public::cell::CellId;
use crate::public::cell::builtins::Latch;
use crate::public::failure::Failure;
use crate::public::resource::dynamics::{Dynamics, Expiring, Expiry, Extrapolate};
use crate::public::resource::{Res, derived};
use anyhow::bail;
use hifitime::Duration;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::ops::Bound::{Excluded, Unbounded};

pub fn constant<T: Clone + Send + Sync + 'static>(value: T) -> Res<T> {
    derived(move |_| Expiring::never(Dynamics::Constant(value.clone())))
}

/// Applies a function to the current value of a resource.
pub fn map<A, T, F>(source: &Res<A>, f: F) -> Res<T>
where
    A: Clone + 'static,
    T: 'static,
    F: Fn(&A) -> T + Send + Sync + 'static,
{
    let source = source.clone();
    derived(move |q| {
        let input = source.evaluate(q);
        let expiry = settle(&input);
        match input.data.value() {
            Ok(v) => Expiring::new(Dynamics::Constant(f(&v)), expiry),
            Err(failure) => Expiring::new(Dynamics::Failed(failure), input.expiry),
        }
    })
}

/// Like [map], for functions that can fail. Errors become [Failure::Evaluation].
pub fn try_map<A, T, F>(source: &Res<A>, f: F) -> Res<T>
where
    A: Clone + 'static,
    T: 'static,
    F: Fn(&A) -> anyhow::Result<T> + Send + Sync + 'static,
{
    let source = source.clone();
    derived(move |q| {
        let input = source.evaluate(q);
        let expiry = settle(&input);
        let data = match input.data.value() {
            Ok(v) => match f(&v) {
                Ok(out) => Dynamics::Constant(out),
                Err(e) => Dynamics::Failed(Failure::evaluation(format!("{e:#}"))),
            },
            Err(failure) => Dynamics::Failed(failure),
        };
        Expiring::new(data, expiry)
    })
}

pub fn map2<A, B, T, F>(a: &Res<A>, b: &Res<B>, f: F) -> Res<T>
where
    A: Clone + 'static,
    B: Clone + 'static,
    T: 'static,
    F: Fn(&A, &B) -> T + Send + Sync + 'static,
{
    let (a, b) = (a.clone(), b.clone());
    derived(move |q| {
        let left = a.evaluate(q);
        let right = b.evaluate(q);
        let expiry = settle(&left).min(settle(&right));
        let data = match (left.data.value(), right.data.value()) {
            (Ok(l), Ok(r)) => Dynamics::Constant(f(&l, &r)),
            (Err(failure), _) | (_, Err(failure)) => Dynamics::Failed(failure),
        };
        Expiring::new(data, expiry)
    })
}

/// Selects between two resources. Only the selected branch is evaluated, so only its expiry
/// constrains the result.
pub fn choose<T: 'static>(condition: &Res<bool>, then: &Res<T>, otherwise: &Res<T>) -> Res<T> {
    let (condition, then, otherwise) = (condition.clone(), then.clone(), otherwise.clone());
    derived(move |q| {
        let cond = condition.evaluate(q);
        let expiry = settle(&cond);
        match cond.data.value() {
            Ok(true) => {
                let chosen = then.evaluate(q);
                Expiring::new(chosen.data, expiry.min(chosen.expiry))
            }
            Ok(false) => {
                let chosen = otherwise.evaluate(q);
                Expiring::new(chosen.data, expiry.min(chosen.expiry))
            }
            Err(failure) => Expiring::new(Dynamics::Failed(failure), expiry),
        }
    })
}

/// Short-circuiting conjunction. If `a` is false, `b` is neither evaluated nor tracked.
pub fn and(a: &Res<bool>, b: &Res<bool>) -> Res<bool> {
    choose(a, b, &constant(false))
}

/// Short-circuiting disjunction. If `a` is true, `b` is neither evaluated nor tracked.
pub fn or(a: &Res<bool>, b: &Res<bool>) -> Res<bool> {
    choose(a, &constant(true), b)
}

pub fn not(a: &Res<bool>) -> Res<bool> {
    map(a, |v| !v)
}

pub fn all(resources: &[Res<bool>]) -> Res<bool> {
    resources
        .iter()
        .rev()
        .fold(constant(true), |rest, r| and(r, &rest))
}

pub fn any(resources: &[Res<bool>]) -> Res<bool> {
    resources
        .iter()
        .rev()
        .fold(constant(false), |rest, r| or(r, &rest))
}

pub fn equals<T>(a: &Res<T>, b: &Res<T>) -> Res<bool>
where
    T: Clone + PartialEq + 'static,
{
    map2(a, b, |l, r| l == r)
}

/// Fails with [Failure::Assertion] whenever `condition` is false.
pub fn assert_that(description: impl Display, condition: &Res<bool>) -> Res<bool> {
    let description = description.to_string();
    let condition = condition.clone();
    derived(move |q| {
        let cond = condition.evaluate(q);
        let data = match cond.data.value() {
            Ok(true) => Dynamics::Constant(true),
            Ok(false) => Dynamics::Failed(Failure::Assertion {
                description: description.clone(),
            }),
            Err(failure) => Dynamics::Failed(failure),
        };
        Expiring::new(data, settle(&cond))
    })
}

/// Catches failures, replacing them with a value computed from the failure.
pub fn recover<T, F>(source: &Res<T>, f: F) -> Res<T>
where
    T: 'static,
    F: Fn(&Failure) -> T + Send + Sync + 'static,
{
    let source = source.clone();
    derived(move |q| {
        let Expiring { data, expiry } = source.evaluate(q);
        match data {
            Dynamics::Failed(failure) => Expiring::new(Dynamics::Constant(f(&failure)), expiry),
            other => Expiring::new(other, expiry),
        }
    })
}

/// A step function known ahead of time. `before` holds until the first segment starts.
pub fn precomputed<T>(before: T, segments: BTreeMap<Time, T>) -> Res<T>
where
    T: Clone + Send + Sync + 'static,
{
    let segments: BTreeMap<Duration, T> = segments
        .into_iter()
        .map(|(t, v)| (epoch_to_duration(t), v))
        .collect();
    derived(move |q| {
        let now = q.now;
        let value = segments
            .range(..=now)
            .next_back()
            .map_or(&before, |(_, v)| v)
            .clone();
        let expiry = segments
            .range((Excluded(now), Unbounded))
            .next()
            .map_or(Expiry::NEVER, |(t, _)| Expiry::at(*t - now));
        Expiring::new(Dynamics::Constant(value), expiry)
    })
}

/// A copy of `source` that is only refreshed every `period`.
///
/// A daemon task samples the source into a cell at the branch's current time and every
/// period after. Branches with a sampled resource never quiesce; run them with
/// [Branch::run_until] or a step limit.
pub fn sampled<T>(
    branch: &mut Branch,
    source: &Res<T>,
    period: Duration,
) -> anyhow::Result<Res<T>>
where
    T: Extrapolate + PartialEq + Debug,
{
    if period <= Duration::ZERO {
        bail!("sampling period must be positive, got {period}");
    }
    let first = hold(branch.evaluate(source).data);
    let latch = branch.allocate(Latch::new(Expiring::never(first)));
    let now = branch.now();
    branch.schedule_activity(
        Sampler {
            source: source.clone(),
            latch,
            period,
        },
        now,
    )?;

    Ok(derived(move |q| match q.cell(latch) {
        Ok(cell) => Expiring::never(cell.held.data.step(q.elapsed())),
        Err(failure) => Expiring::new(Dynamics::Failed(failure), Expiry::NOW),
    }))
}

/// Takes one sample, waits a period, then hands over to a fresh copy of itself so that
/// replay never grows.
#[derive(Clone)]
struct Sampler<T> {
    source: Res<T>,
    latch: CellId<Latch<T>>,
    period: Duration,
}

impl<T> Activity for Sampler<T>
where
    T: Extrapolate + PartialEq + Debug,
{
    fn run(&self, ctx: &mut TaskContext) -> TaskResult {
        let held = hold(ctx.dynamics(&self.source).data);
        ctx.emit(self.latch, Some(Expiring::never(held)));
        ctx.defer(self.period)?;
        ctx.spawn(self.clone())?;
        Ok(())
    }

    fn name(&self) -> &str {
        "sampler"
    }
}

/// A sample holds the value it saw.
fn hold<T>(dynamics: Dynamics<T>) -> Dynamics<T> {
    match dynamics {
        Dynamics::Linear { value, .. } => Dynamics::Constant(value),
        other => other,
    }
}

/// The expiry of an answer once its value has been collapsed to a constant.
fn settle<T>(input: &Expiring<Dynamics<T>>) -> Expiry {
    if input.data.is_varying() {
        Expiry::NOW
    } else {
        input.expiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulationConfig;
    use crate::internal::clock::duration_to_epoch;
    use hifitime::TimeUnits;

    fn branch() -> Branch {
        Branch::new(duration_to_epoch(Duration::ZERO), SimulationConfig::default())
    }

    #[test]
    fn and_short_circuits_expiry() {
        let branch = branch();
        let expiring = derived(|_| Expiring::new(Dynamics::Constant(true), Expiry::at(1.seconds())));
        let result = branch.evaluate(&and(&constant(false), &expiring));
        assert_eq!(Dynamics::Constant(false), result.data);
        assert_eq!(Expiry::NEVER, result.expiry);

        let result = branch.evaluate(&and(&constant(true), &expiring));
        assert_eq!(Dynamics::Constant(true), result.data);
        assert_eq!(Expiry::at(1.seconds()), result.expiry);
    }

    #[test]
    fn failures_propagate_through_map() {
        let branch = branch();
        let failing: Res<i32> =
            derived(|_| Expiring::never(Dynamics::Failed(Failure::evaluation("no data"))));
        let mapped = map(&failing, |v| v * 2);
        assert_eq!(Err(Failure::evaluation("no data")), branch.read(&mapped));

        let recovered = recover(&mapped, |_| -1);
        assert_eq!(Ok(-1), branch.read(&recovered));
    }

    #[test]
    fn precomputed_expires_at_next_step() {
        let branch = branch();
        let mut segments = BTreeMap::new();
        segments.insert(duration_to_epoch(10.seconds()), "b");
        segments.insert(duration_to_epoch(20.seconds()), "c");
        let step = precomputed("a", segments);

        let at_start = branch.evaluate(&step);
        assert_eq!(Dynamics::Constant("a"), at_start.data);
        assert_eq!(Expiry::at(10.seconds()), at_start.expiry);

        let at_twelve = branch
            .evaluate_at(&step, duration_to_epoch(12.seconds()))
            .unwrap();
        assert_eq!(Dynamics::Constant("b"), at_twelve.data);
        assert_eq!(Expiry::at(8.seconds()), at_twelve.expiry);
    }

    #[test]
    fn all_of_nothing_is_true() {
        let branch = branch();
        assert_eq!(Ok(true), branch.read(&all(&[])));
        assert_eq!(Ok(false), branch.read(&any(&[])));
        assert_eq!(
            Ok(true),
            branch.read(&any(&[constant(false), constant(true)]))
        );
    }
}
