#![allow(unused)]

use kestrel::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

pub fn seconds(s: i32) -> Time {
    Time::from_tai_seconds(s as f64)
}

/// A branch starting at zero with every debug check on.
pub fn new_branch() -> Branch {
    Branch::new(
        seconds(0),
        SimulationConfig::new()
            .check_commutativity(true)
            .check_replay(true)
            .diagnostics(true),
    )
}

/// Adds `amount` to an accumulator.
pub struct Deposit {
    pub cell: CellId<Accumulator>,
    pub amount: f64,
}

impl Activity for Deposit {
    fn run(&self, ctx: &mut TaskContext) -> TaskResult {
        ctx.emit(self.cell, self.amount);
        Ok(())
    }

    fn name(&self) -> &str {
        "deposit"
    }
}

/// Changes a fuel flow rate for a while, then restores it.
pub struct Burn {
    pub tank: CellId<LinearIntegrator>,
    pub rate: f64,
    pub duration: Duration,
}

impl Activity for Burn {
    fn run(&self, ctx: &mut TaskContext) -> TaskResult {
        ctx.emit(self.tank, -self.rate);
        ctx.defer(self.duration)?;
        ctx.emit(self.tank, self.rate);
        Ok(())
    }

    fn name(&self) -> &str {
        "burn"
    }
}

/// Counts how many times its body has been run, including replays.
///
/// Only for observing the engine. Models must not do this.
pub struct RunCounter {
    pub runs: Arc<AtomicU32>,
    pub delays: u32,
}

impl RunCounter {
    pub fn new(delays: u32) -> (Self, Arc<AtomicU32>) {
        let runs = Arc::new(AtomicU32::new(0));
        (
            Self {
                runs: runs.clone(),
                delays,
            },
            runs,
        )
    }
}

impl Activity for RunCounter {
    fn run(&self, ctx: &mut TaskContext) -> TaskResult {
        self.runs.fetch_add(1, Ordering::SeqCst);
        for _ in 0..self.delays {
            ctx.defer(1.seconds())?;
        }
        Ok(())
    }
}
