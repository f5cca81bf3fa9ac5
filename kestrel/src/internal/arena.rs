use crate::public::cell::{Cell, CellId, Effect};
use crate::public::effect::EffectAlgebra;
use crate::public::failure::Failure;
use hifitime::Duration;
use std::any::{Any, type_name};

/// An effect waiting for its batch to be committed, erased so one batch can hold effects for
/// every kind of cell.
pub type PendingEffect = Box<dyn Any + Send + Sync>;

/// A cell plus the merge failure committed to it at the latest instant, if any.
#[derive(Clone, Debug)]
pub struct Slot<C> {
    pub cell: C,
    pub failure: Option<Failure>,
}

/// The outcome of committing one cell's batch of effects.
#[derive(Default, Debug)]
pub struct CommitReport {
    pub failure: Option<Failure>,
    /// Set when applying the batch's effects in different orders gave different states.
    pub violation: Option<String>,
}

pub trait ErasedCell: Any + Send + Sync {
    fn advance(&mut self, elapsed: Duration);
    fn fork(&self) -> Box<dyn ErasedCell>;
    fn commit(
        &mut self,
        index: usize,
        effects: &[PendingEffect],
        probe: Option<f64>,
    ) -> CommitReport;
    fn failure(&self) -> Option<&Failure>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: Cell> ErasedCell for Slot<C> {
    fn advance(&mut self, elapsed: Duration) {
        if elapsed > Duration::ZERO {
            self.failure = None;
            self.cell.advance(elapsed);
        }
    }

    fn fork(&self) -> Box<dyn ErasedCell> {
        Box::new(Slot {
            cell: self.cell.fork(),
            failure: self.failure.clone(),
        })
    }

    fn commit(
        &mut self,
        index: usize,
        effects: &[PendingEffect],
        probe: Option<f64>,
    ) -> CommitReport {
        let mut typed = Vec::with_capacity(effects.len());
        for effect in effects {
            match effect.downcast_ref::<Effect<C>>() {
                Some(e) => typed.push(e),
                None => {
                    return self.fail(
                        index,
                        format!("effect is not a {}", type_name::<Effect<C>>()),
                    );
                }
            }
        }

        let combined = match C::Algebra::fold(typed.iter().copied()) {
            Ok(c) => c,
            Err(e) => return self.fail(index, format!("{e:#}")),
        };
        let mut next = self.cell.clone();
        if let Err(e) = next.apply(&combined) {
            return self.fail(index, format!("{e:#}"));
        }

        let violation = probe.and_then(|tolerance| self.probe(&typed, tolerance));
        self.cell = next;
        self.failure = None;
        CommitReport {
            failure: None,
            violation,
        }
    }

    fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<C: Cell> Slot<C> {
    fn fail(&mut self, index: usize, reason: String) -> CommitReport {
        let failure = Failure::EffectMerge {
            cell: index,
            reason,
        };
        self.failure = Some(failure.clone());
        CommitReport {
            failure: Some(failure),
            violation: None,
        }
    }

    /// Applies every pair of effects in both orders to copies of the pre-commit state.
    fn probe(&self, effects: &[&Effect<C>], tolerance: f64) -> Option<String> {
        for (i, a) in effects.iter().enumerate() {
            for b in &effects[i + 1..] {
                let (Ok(ab), Ok(ba)) = (C::Algebra::combine(a, b), C::Algebra::combine(b, a))
                else {
                    continue;
                };
                let mut left = self.cell.clone();
                let mut right = self.cell.clone();
                if left.apply(&ab).is_err() || right.apply(&ba).is_err() {
                    continue;
                }
                if !left.equivalent(&right, tolerance) {
                    return Some(format!(
                        "effects {a:?} and {b:?} on {} do not commute: {left:?} != {right:?}",
                        type_name::<C>()
                    ));
                }
            }
        }
        None
    }
}

/// A branch-local arena of cells, indexed by [CellId].
#[derive(Default)]
pub struct CellArena {
    slots: Vec<Box<dyn ErasedCell>>,
}

impl CellArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate<C: Cell>(&mut self, cell: C) -> CellId<C> {
        let id = CellId::new(self.slots.len());
        self.slots.push(Box::new(Slot {
            cell,
            failure: None,
        }));
        id
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot<C: Cell>(&self, id: CellId<C>) -> Option<&Slot<C>> {
        self.slots.get(id.index)?.as_any().downcast_ref()
    }

    pub fn slot_mut<C: Cell>(&mut self, id: CellId<C>) -> Option<&mut Slot<C>> {
        self.slots.get_mut(id.index)?.as_any_mut().downcast_mut()
    }

    pub fn failure(&self, index: usize) -> Option<&Failure> {
        self.slots.get(index)?.failure()
    }

    pub fn advance(&mut self, elapsed: Duration) {
        for slot in &mut self.slots {
            slot.advance(elapsed);
        }
    }

    /// A deep, independent copy of every cell.
    pub fn fork(&self) -> Self {
        Self {
            slots: self.slots.iter().map(|s| s.fork()).collect(),
        }
    }

    pub fn commit(
        &mut self,
        index: usize,
        effects: &[PendingEffect],
        probe: Option<f64>,
    ) -> CommitReport {
        match self.slots.get_mut(index) {
            Some(slot) => slot.commit(index, effects, probe),
            None => CommitReport {
                failure: Some(Failure::EffectMerge {
                    cell: index,
                    reason: "cell does not exist in this branch".to_string(),
                }),
                violation: None,
            },
        }
    }
}
