//! Effect algebras.
//!
//! Every cell declares how two effects landing on it at the same simulated instant combine
//! into one. The scheduler folds all of an instant's effects on a cell, seeded by the identity,
//! and applies the result once. Because the order in which tasks at one instant run is not
//! meaningful, `combine` must be associative and should be commutative.

use anyhow::{Result, anyhow, bail};
use duplicate::duplicate_item;
use num::{CheckedAdd, CheckedMul, One, Zero};
use std::fmt::Debug;
use std::marker::PhantomData;

/// How concurrent effects on one kind of cell combine.
pub trait EffectAlgebra: 'static {
    type Effect: Clone + Debug + Send + Sync + 'static;

    /// The effect that changes nothing.
    fn identity() -> Self::Effect;

    /// Combines two effects that happened at the same instant.
    fn combine(left: &Self::Effect, right: &Self::Effect) -> Result<Self::Effect>;

    /// Folds a batch of concurrent effects, seeded by [EffectAlgebra::identity].
    fn fold<'e>(effects: impl IntoIterator<Item = &'e Self::Effect>) -> Result<Self::Effect> {
        effects
            .into_iter()
            .try_fold(Self::identity(), |acc, effect| Self::combine(&acc, effect))
    }
}

/// Numbers that [Sum] and [Product] can combine.
///
/// Integers report overflow as `None`. Floats saturate to infinity like ordinary arithmetic.
pub trait Arithmetic: 'static + Zero + One + Clone + Debug + Send + Sync {
    fn try_add(&self, other: &Self) -> Option<Self>;
    fn try_mul(&self, other: &Self) -> Option<Self>;
}

#[duplicate_item(ty; [i8]; [i16]; [i32]; [i64]; [i128]; [u8]; [u16]; [u32]; [u64]; [u128])]
impl Arithmetic for ty {
    fn try_add(&self, other: &Self) -> Option<Self> {
        CheckedAdd::checked_add(self, other)
    }
    fn try_mul(&self, other: &Self) -> Option<Self> {
        CheckedMul::checked_mul(self, other)
    }
}

#[duplicate_item(ty; [f32]; [f64])]
impl Arithmetic for ty {
    fn try_add(&self, other: &Self) -> Option<Self> {
        Some(self + other)
    }
    fn try_mul(&self, other: &Self) -> Option<Self> {
        Some(self * other)
    }
}

/// Concurrent effects add. Integer overflow fails the merge.
pub struct Sum<T>(PhantomData<T>);

impl<T: Arithmetic> EffectAlgebra for Sum<T> {
    type Effect = T;

    fn identity() -> T {
        T::zero()
    }

    fn combine(left: &T, right: &T) -> Result<T> {
        left.try_add(right)
            .ok_or_else(|| anyhow!("overflow adding concurrent effects {left:?} and {right:?}"))
    }
}

/// Concurrent effects multiply. Integer overflow fails the merge.
pub struct Product<T>(PhantomData<T>);

impl<T: Arithmetic> EffectAlgebra for Product<T> {
    type Effect = T;

    fn identity() -> T {
        T::one()
    }

    fn combine(left: &T, right: &T) -> Result<T> {
        left.try_mul(right).ok_or_else(|| {
            anyhow!("overflow multiplying concurrent effects {left:?} and {right:?}")
        })
    }
}

/// The largest of the concurrent effects wins. `None` is the identity.
pub struct Max<T>(PhantomData<T>);

impl<T> EffectAlgebra for Max<T>
where
    T: 'static + PartialOrd + Clone + Debug + Send + Sync,
{
    type Effect = Option<T>;

    fn identity() -> Option<T> {
        None
    }

    fn combine(left: &Option<T>, right: &Option<T>) -> Result<Option<T>> {
        Ok(match (left, right) {
            (Some(l), Some(r)) => Some(if r > l { r.clone() } else { l.clone() }),
            (l, None) => l.clone(),
            (None, r) => r.clone(),
        })
    }
}

/// The smallest of the concurrent effects wins. `None` is the identity.
pub struct Min<T>(PhantomData<T>);

impl<T> EffectAlgebra for Min<T>
where
    T: 'static + PartialOrd + Clone + Debug + Send + Sync,
{
    type Effect = Option<T>;

    fn identity() -> Option<T> {
        None
    }

    fn combine(left: &Option<T>, right: &Option<T>) -> Result<Option<T>> {
        Ok(match (left, right) {
            (Some(l), Some(r)) => Some(if r < l { r.clone() } else { l.clone() }),
            (l, None) => l.clone(),
            (None, r) => r.clone(),
        })
    }
}

/// Boolean "or" over concurrent flags.
pub struct Disjunction;

impl EffectAlgebra for Disjunction {
    type Effect = bool;

    fn identity() -> bool {
        false
    }

    fn combine(left: &bool, right: &bool) -> Result<bool> {
        Ok(*left || *right)
    }
}

/// Boolean "and" over concurrent flags.
pub struct Conjunction;

impl EffectAlgebra for Conjunction {
    type Effect = bool;

    fn identity() -> bool {
        true
    }

    fn combine(left: &bool, right: &bool) -> Result<bool> {
        Ok(*left && *right)
    }
}

/// A "set to this value" effect. `None` is the identity.
///
/// Two equal concurrent sets collapse into one. Two different concurrent sets have no
/// order-independent answer, so combining them fails.
pub struct SetOnce<T>(PhantomData<T>);

impl<T> EffectAlgebra for SetOnce<T>
where
    T: 'static + PartialEq + Clone + Debug + Send + Sync,
{
    type Effect = Option<T>;

    fn identity() -> Option<T> {
        None
    }

    fn combine(left: &Option<T>, right: &Option<T>) -> Result<Option<T>> {
        match (left, right) {
            (Some(l), Some(r)) if l != r => {
                bail!("conflicting concurrent sets: {l:?} and {r:?}")
            }
            (l, None) => Ok(l.clone()),
            (None, r) => Ok(r.clone()),
            (l, Some(_)) => Ok(l.clone()),
        }
    }
}
