//! Real-valued resources.
//!
//! Sums and scalings of linear dynamics are still linear, so [add], [subtract], [scale], and
//! [sum] preserve the shape of their inputs. Products and quotients of varying inputs are not
//! linear; [multiply], [divide], and [product] combine current values only.
//!
//! Comparisons against a threshold compute when a linear input will cross it, and expire
//! exactly at the instant their answer would change.

use crate::public::failure::Failure;
use crate::public::resource::dynamics::{Dynamics, Expiring, Expiry};
use crate::public::resource::discrete::constant;
use crate::public::resource::{Res, derived};
use hifitime::Duration;

/// Linear dynamics that track elapsed seconds since the branch started.
pub fn clock() -> Res<f64> {
    derived(|q| Expiring::never(Dynamics::linear(q.since_start().to_seconds(), 1.0)))
}

pub fn add(a: &Res<f64>, b: &Res<f64>) -> Res<f64> {
    linear2(a, b, |(av, ar), (bv, br)| (av + bv, ar + br))
}

pub fn subtract(a: &Res<f64>, b: &Res<f64>) -> Res<f64> {
    linear2(a, b, |(av, ar), (bv, br)| (av - bv, ar - br))
}

pub fn scale(a: &Res<f64>, factor: f64) -> Res<f64> {
    let a = a.clone();
    derived(move |q| {
        let Expiring { data, expiry } = a.evaluate(q);
        let data = match data.parts() {
            Ok((value, rate)) => Dynamics::from_parts(value * factor, rate * factor),
            Err(failure) => Dynamics::Failed(failure),
        };
        Expiring::new(data, expiry)
    })
}

pub fn sum(resources: &[Res<f64>]) -> Res<f64> {
    let resources = resources.to_vec();
    derived(move |q| {
        let mut total = (0.0, 0.0);
        let mut expiry = Expiry::NEVER;
        for r in &resources {
            let answer = r.evaluate(q);
            expiry = expiry.min(answer.expiry);
            match answer.data.parts() {
                Ok((value, rate)) => {
                    total.0 += value;
                    total.1 += rate;
                }
                Err(failure) => return Expiring::new(Dynamics::Failed(failure), expiry),
            }
        }
        Expiring::new(Dynamics::from_parts(total.0, total.1), expiry)
    })
}

pub fn multiply(a: &Res<f64>, b: &Res<f64>) -> Res<f64> {
    discrete2(a, b, |x, y| Ok(x * y))
}

/// Fails with [Failure::Evaluation] when dividing by zero.
pub fn divide(a: &Res<f64>, b: &Res<f64>) -> Res<f64> {
    discrete2(a, b, |x, y| {
        if y == 0.0 {
            Err(Failure::evaluation(format!("division of {x} by zero")))
        } else {
            Ok(x / y)
        }
    })
}

pub fn product(resources: &[Res<f64>]) -> Res<f64> {
    resources
        .iter()
        .fold(constant(1.0), |acc, r| multiply(&acc, r))
}

pub fn greater_than(a: &Res<f64>, threshold: f64) -> Res<bool> {
    compare(a, threshold, |v, t| v > t)
}

pub fn greater_or_equal(a: &Res<f64>, threshold: f64) -> Res<bool> {
    compare(a, threshold, |v, t| v >= t)
}

pub fn less_than(a: &Res<f64>, threshold: f64) -> Res<bool> {
    compare(a, threshold, |v, t| v < t)
}

pub fn less_or_equal(a: &Res<f64>, threshold: f64) -> Res<bool> {
    compare(a, threshold, |v, t| v <= t)
}

fn linear2<F>(a: &Res<f64>, b: &Res<f64>, f: F) -> Res<f64>
where
    F: Fn((f64, f64), (f64, f64)) -> (f64, f64) + Send + Sync + 'static,
{
    let (a, b) = (a.clone(), b.clone());
    derived(move |q| {
        let left = a.evaluate(q);
        let right = b.evaluate(q);
        let expiry = left.expiry.min(right.expiry);
        let data = match (left.data.parts(), right.data.parts()) {
            (Ok(l), Ok(r)) => {
                let (value, rate) = f(l, r);
                Dynamics::from_parts(value, rate)
            }
            (Err(failure), _) | (_, Err(failure)) => Dynamics::Failed(failure),
        };
        Expiring::new(data, expiry)
    })
}

fn discrete2<F>(a: &Res<f64>, b: &Res<f64>, f: F) -> Res<f64>
where
    F: Fn(f64, f64) -> Result<f64, Failure> + Send + Sync + 'static,
{
    let (a, b) = (a.clone(), b.clone());
    derived(move |q| {
        let left = a.evaluate(q);
        let right = b.evaluate(q);
        let expiry = if left.data.is_varying() || right.data.is_varying() {
            Expiry::NOW
        } else {
            left.expiry.min(right.expiry)
        };
        let data = match (left.data.value(), right.data.value()) {
            (Ok(l), Ok(r)) => match f(l, r) {
                Ok(v) => Dynamics::Constant(v),
                Err(failure) => Dynamics::Failed(failure),
            },
            (Err(failure), _) | (_, Err(failure)) => Dynamics::Failed(failure),
        };
        Expiring::new(data, expiry)
    })
}

fn compare<F>(a: &Res<f64>, threshold: f64, predicate: F) -> Res<bool>
where
    F: Fn(f64, f64) -> bool + Send + Sync + 'static,
{
    let a = a.clone();
    derived(move |q| {
        let Expiring { data, expiry } = a.evaluate(q);
        let (value, rate) = match data.parts() {
            Ok(parts) => parts,
            Err(failure) => return Expiring::new(Dynamics::Failed(failure), expiry),
        };
        let current = predicate(value, threshold);
        let change = crossing(value, rate, threshold, current, &predicate);
        Expiring::new(Dynamics::Constant(current), expiry.min(change))
    })
}

/// When a comparison against a linear value next changes its answer.
fn crossing(
    value: f64,
    rate: f64,
    threshold: f64,
    current: bool,
    predicate: impl Fn(f64, f64) -> bool,
) -> Expiry {
    if rate == 0.0 {
        return Expiry::NEVER;
    }
    let seconds = (threshold - value) / rate;
    if seconds < 0.0 || !seconds.is_finite() {
        return Expiry::NEVER;
    }
    let at_crossing = predicate(threshold, threshold);
    let past_crossing = if rate > 0.0 {
        predicate(threshold + 1.0, threshold)
    } else {
        predicate(threshold - 1.0, threshold)
    };
    let crossing = Duration::from_seconds(seconds);
    if seconds > 0.0 && current != at_crossing {
        Expiry::at(crossing)
    } else if at_crossing != past_crossing {
        // Changes just after the crossing instant.
        Expiry::at(crossing + Duration::from_total_nanoseconds(1))
    } else {
        Expiry::NEVER
    }
}
