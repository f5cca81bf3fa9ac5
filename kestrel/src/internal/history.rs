use crate::Time;
use crate::internal::arena::CellArena;
use crate::internal::clock::duration_to_epoch;
use derive_more::Deref;
use hifitime::Duration;
use std::sync::Arc;

/// One quiescent point: the state of every cell after an instant's batch was committed.
#[derive(Clone)]
pub struct HistoryPoint {
    pub(crate) time: Duration,
    pub(crate) delta: Duration,
    pub(crate) cells: Arc<CellArena>,
}

impl HistoryPoint {
    pub fn time(&self) -> Time {
        duration_to_epoch(self.time)
    }

    /// Time since the previous point. Zero for consecutive batches at one instant.
    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn cells(&self) -> &CellArena {
        &self.cells
    }
}

/// A branch's append-only sequence of committed points, non-decreasing in time.
///
/// Snapshots are immutable once pushed, so forks share them instead of copying.
#[derive(Clone, Default, Deref)]
pub struct History {
    points: Vec<HistoryPoint>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: Duration, cells: CellArena) -> usize {
        let delta = match self.points.last() {
            Some(last) => {
                debug_assert!(time >= last.time, "history must not go backward");
                time - last.time
            }
            None => Duration::ZERO,
        };
        self.points.push(HistoryPoint {
            time,
            delta,
            cells: Arc::new(cells),
        });
        self.points.len() - 1
    }

    pub fn last_index(&self) -> Option<usize> {
        self.points.len().checked_sub(1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter()
    }

    /// The index of the latest point at or before `time`. Of several points at one instant,
    /// the last is the settled one.
    pub(crate) fn index_at(&self, time: Duration) -> Option<usize> {
        self.points
            .partition_point(|p| p.time <= time)
            .checked_sub(1)
    }

    /// The time of the first point strictly after `time`.
    pub(crate) fn next_after(&self, time: Duration) -> Option<Duration> {
        let index = self.points.partition_point(|p| p.time <= time);
        self.points.get(index).map(|p| p.time)
    }
}
