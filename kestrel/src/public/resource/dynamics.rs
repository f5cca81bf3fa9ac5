use crate::public::failure::Failure;
use duplicate::duplicate_item;
use hifitime::Duration;
use serde::{Deserialize, Serialize};

/// How a value evolves when no further effects are applied.
///
/// Dynamics are always expressed relative to the instant they were produced at. A
/// `Linear` dynamics' `value` is the value at that instant, and its `rate` is per second.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Dynamics<T> {
    Constant(T),
    Linear { value: T, rate: T },
    Failed(Failure),
}

/// Allows a type to be the value of a [Dynamics].
///
/// Only continuous types have meaningful linear dynamics; discrete types implement this by
/// returning the starting value unchanged, and never produce [Dynamics::Linear].
pub trait Extrapolate: Clone + Send + Sync + 'static {
    fn extrapolate(value: &Self, rate: &Self, seconds: f64) -> Self;
}

#[duplicate_item(ty; [f64]; [f32])]
impl Extrapolate for ty {
    fn extrapolate(value: &Self, rate: &Self, seconds: f64) -> Self {
        *value + *rate * seconds as ty
    }
}

#[duplicate_item(
    ty;
    [bool]; [char]; [()];
    [i8]; [i16]; [i32]; [i64]; [u8]; [u16]; [u32]; [u64]; [usize];
    [String]; [Duration]
)]
impl Extrapolate for ty {
    fn extrapolate(value: &Self, _rate: &Self, _seconds: f64) -> Self {
        value.clone()
    }
}

impl<T: Clone + Send + Sync + 'static> Extrapolate for Vec<T> {
    fn extrapolate(value: &Self, _rate: &Self, _seconds: f64) -> Self {
        value.clone()
    }
}

impl<T: Clone + Send + Sync + 'static> Extrapolate for Option<T> {
    fn extrapolate(value: &Self, _rate: &Self, _seconds: f64) -> Self {
        value.clone()
    }
}

impl<T> Dynamics<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, Dynamics::Failed(_))
    }

    /// Whether this dynamics may change value with the passage of time alone.
    pub fn is_varying(&self) -> bool {
        matches!(self, Dynamics::Linear { .. })
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Dynamics::Failed(f) => Some(f),
            _ => None,
        }
    }
}

impl<T: Clone> Dynamics<T> {
    /// The value at the instant these dynamics were produced.
    pub fn value(&self) -> Result<T, Failure> {
        match self {
            Dynamics::Constant(v) => Ok(v.clone()),
            Dynamics::Linear { value, .. } => Ok(value.clone()),
            Dynamics::Failed(f) => Err(f.clone()),
        }
    }
}

impl<T: Extrapolate> Dynamics<T> {
    /// Projects these dynamics forward. This never changes the shape of a valid dynamics,
    /// only the instant it is expressed relative to.
    pub fn step(&self, elapsed: Duration) -> Self {
        match self {
            Dynamics::Linear { value, rate } if elapsed != Duration::ZERO => Dynamics::Linear {
                value: T::extrapolate(value, rate, elapsed.to_seconds()),
                rate: rate.clone(),
            },
            other => other.clone(),
        }
    }

    pub fn value_at(&self, elapsed: Duration) -> Result<T, Failure> {
        self.step(elapsed).value()
    }
}

impl Dynamics<f64> {
    pub fn linear(value: f64, rate: f64) -> Self {
        Dynamics::Linear { value, rate }
    }

    /// The value and rate of a real-valued dynamics.
    pub fn parts(&self) -> Result<(f64, f64), Failure> {
        match self {
            Dynamics::Constant(v) => Ok((*v, 0.0)),
            Dynamics::Linear { value, rate } => Ok((*value, *rate)),
            Dynamics::Failed(f) => Err(f.clone()),
        }
    }

    pub fn from_parts(value: f64, rate: f64) -> Self {
        if rate == 0.0 {
            Dynamics::Constant(value)
        } else {
            Dynamics::Linear { value, rate }
        }
    }
}

/// How long a derived answer stays valid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expiry(Option<Duration>);

impl Expiry {
    /// No known limit.
    pub const NEVER: Expiry = Expiry(None);

    /// Valid only at the instant it was produced.
    pub const NOW: Expiry = Expiry(Some(Duration::ZERO));

    pub fn at(duration: Duration) -> Self {
        Expiry(Some(duration.max(Duration::ZERO)))
    }

    pub fn value(self) -> Option<Duration> {
        self.0
    }

    pub fn is_never(self) -> bool {
        self.0.is_none()
    }

    /// The tighter of two expiries.
    pub fn min(self, other: Expiry) -> Expiry {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Expiry(Some(a.min(b))),
            (Some(a), None) | (None, Some(a)) => Expiry(Some(a)),
            (None, None) => Expiry::NEVER,
        }
    }

    /// The remaining expiry after some time has passed, saturating at zero.
    pub fn minus(self, elapsed: Duration) -> Expiry {
        match self.0 {
            Some(d) => Expiry(Some((d - elapsed).max(Duration::ZERO))),
            None => Expiry::NEVER,
        }
    }

    /// Whether an answer produced `elapsed` ago is still valid.
    pub fn covers(self, elapsed: Duration) -> bool {
        match self.0 {
            Some(d) => elapsed < d,
            None => true,
        }
    }
}

/// A value paired with the [Expiry] bounding how long it stays valid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expiring<D> {
    pub data: D,
    pub expiry: Expiry,
}

impl<D> Expiring<D> {
    pub fn new(data: D, expiry: Expiry) -> Self {
        Self { data, expiry }
    }

    pub fn never(data: D) -> Self {
        Self {
            data,
            expiry: Expiry::NEVER,
        }
    }
}

impl<T: Extrapolate> Expiring<Dynamics<T>> {
    /// Projects both the dynamics and the expiry forward.
    pub fn step(&self, elapsed: Duration) -> Self {
        Self {
            data: self.data.step(elapsed),
            expiry: self.expiry.minus(elapsed),
        }
    }
}
