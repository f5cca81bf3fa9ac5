use crate::public::cell::{Cell, approximately_equal};
use crate::public::effect::{SetOnce, Sum};
use crate::public::resource::dynamics::{Dynamics, Expiring, Extrapolate};
use anyhow::{Result, anyhow};
use hifitime::Duration;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A real value that concurrent effects add to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Accumulator {
    pub value: f64,
}

impl Accumulator {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl Cell for Accumulator {
    type Algebra = Sum<f64>;
    type Value = f64;

    fn apply(&mut self, delta: &f64) -> Result<()> {
        self.value += delta;
        Ok(())
    }

    fn advance(&mut self, _elapsed: Duration) {}

    fn dynamics(&self) -> Dynamics<f64> {
        Dynamics::Constant(self.value)
    }

    fn equivalent(&self, other: &Self, tolerance: f64) -> bool {
        approximately_equal(self.value, other.value, tolerance)
    }
}

/// An integer count that concurrent effects add to. Overflow is a merge failure.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub count: i64,
}

impl Counter {
    pub fn new(count: i64) -> Self {
        Self { count }
    }
}

impl Cell for Counter {
    type Algebra = Sum<i64>;
    type Value = i64;

    fn apply(&mut self, delta: &i64) -> Result<()> {
        self.count = self
            .count
            .checked_add(*delta)
            .ok_or_else(|| anyhow!("counter overflow: {} + {delta}", self.count))?;
        Ok(())
    }

    fn advance(&mut self, _elapsed: Duration) {}

    fn dynamics(&self) -> Dynamics<i64> {
        Dynamics::Constant(self.count)
    }

    fn equivalent(&self, other: &Self, _tolerance: f64) -> bool {
        self == other
    }
}

/// A discrete value that is set by effects. Two different concurrent sets conflict.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Register<T> {
    pub value: T,
}

/// A boolean register.
pub type Toggle = Register<bool>;

impl<T> Register<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> Cell for Register<T>
where
    T: Extrapolate + PartialEq + Debug,
{
    type Algebra = SetOnce<T>;
    type Value = T;

    fn apply(&mut self, effect: &Option<T>) -> Result<()> {
        if let Some(v) = effect {
            self.value = v.clone();
        }
        Ok(())
    }

    fn advance(&mut self, _elapsed: Duration) {}

    fn dynamics(&self) -> Dynamics<T> {
        Dynamics::Constant(self.value.clone())
    }

    fn equivalent(&self, other: &Self, _tolerance: f64) -> bool {
        self == other
    }
}

/// A volume that integrates a rate over time. Effects are deltas to the rate.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearIntegrator {
    pub volume: f64,
    pub rate: f64,
}

impl LinearIntegrator {
    pub fn new(volume: f64, rate: f64) -> Self {
        Self { volume, rate }
    }

    pub fn volume(&self) -> Dynamics<f64> {
        Dynamics::from_parts(self.volume, self.rate)
    }

    pub fn rate(&self) -> Dynamics<f64> {
        Dynamics::Constant(self.rate)
    }
}

impl Cell for LinearIntegrator {
    type Algebra = Sum<f64>;
    type Value = f64;

    fn apply(&mut self, delta: &f64) -> Result<()> {
        self.rate += delta;
        Ok(())
    }

    fn advance(&mut self, elapsed: Duration) {
        self.volume += self.rate * elapsed.to_seconds();
    }

    fn dynamics(&self) -> Dynamics<f64> {
        self.volume()
    }

    fn equivalent(&self, other: &Self, tolerance: f64) -> bool {
        approximately_equal(self.volume, other.volume, tolerance)
            && approximately_equal(self.rate, other.rate, tolerance)
    }
}

/// Holds a snapshot of some resource's dynamics, stepping it forward as time passes.
///
/// Written only by kernel daemons and refreshers (see
/// [sampled][crate::resource::discrete::sampled] and [cache][crate::resource::cache::cache]).
#[derive(Clone, Debug, PartialEq)]
pub struct Latch<T> {
    pub held: Expiring<Dynamics<T>>,
}

impl<T> Latch<T> {
    pub fn new(held: Expiring<Dynamics<T>>) -> Self {
        Self { held }
    }
}

impl<T> Cell for Latch<T>
where
    T: Extrapolate + PartialEq + Debug,
{
    type Algebra = SetOnce<Expiring<Dynamics<T>>>;
    type Value = T;

    fn apply(&mut self, effect: &Option<Expiring<Dynamics<T>>>) -> Result<()> {
        if let Some(held) = effect {
            self.held = held.clone();
        }
        Ok(())
    }

    fn advance(&mut self, elapsed: Duration) {
        self.held = self.held.step(elapsed);
    }

    fn dynamics(&self) -> Dynamics<T> {
        self.held.data.clone()
    }

    fn equivalent(&self, other: &Self, _tolerance: f64) -> bool {
        self == other
    }
}
