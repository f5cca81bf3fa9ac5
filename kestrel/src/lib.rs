//! # Kestrel
//!
//! A deterministic discrete event simulation kernel for spacecraft mission activities.
//!
//! Mission models describe simulated state as a set of [cells](Cell), and behavior as
//! [activities](Activity): ordinary Rust functions that read resources, emit effects, wait for
//! simulated time to pass, spawn children, and wait for each other. Kestrel runs any number of
//! such activities together over virtual time, and guarantees the outcome is a deterministic
//! function of the model and the plan, no matter how the host happens to order work.
//!
//! ## Concepts
//!
//! ### Cells & Effects
//!
//! A cell owns the state of one resource. Model code never writes to a cell directly; it emits
//! effects on it. All effects that land on one cell at one instant are folded through the
//! cell's [EffectAlgebra] and applied once, so the order tasks happened to run in within an
//! instant cannot matter. In debug builds every such batch is also applied in each pairwise
//! order and compared, and effects that do not commute are reported as modeling defects.
//!
//! ### Resources, Dynamics & Expiry
//!
//! A [Resource] is a pure, lazily evaluated function of the committed cells. Evaluating one
//! yields the [Dynamics] of its value (constant, linear, or failed) together with an [Expiry]
//! bounding how long that answer holds. Combinators in [resource::discrete],
//! [resource::real], and [resource::cache] build derived resources and propagate the tightest
//! expiry implied by their inputs. Failures are values: a failing resource evaluates to
//! [Dynamics::Failed] without disturbing its siblings.
//!
//! ### Tasks & Replay
//!
//! Activities are not suspended as continuations. Instead each task keeps a trail of
//! breadcrumbs (the history points it resumed at and the children it spawned) and is re-run
//! from the start every time it resumes, fast-forwarding through the decisions it already made.
//! This requires model code to be a pure function of what it reads through its
//! [TaskContext]. See the [activity module](mod@activity) for details.
//!
//! ### Branches & History
//!
//! A [Branch] owns a cell arena, an append-only [History] of quiescent points, its tasks, and
//! their wake conditions. Branches share nothing mutable: [Branch::fork] copies the cells, so
//! "what if" explorations never disturb their parent, and [run_branches] runs independent
//! branches in parallel.
//!
//! ## Example
//!
//! ```
//! # use kestrel::*;
//! # fn main() -> Result<()> {
//! let start = Time::from_gregorian_utc_at_midnight(2030, 1, 1);
//! let mut branch = Branch::new(start, SimulationConfig::default());
//! let tank = branch.allocate(LinearIntegrator::new(10.0, 0.0));
//! let fuel = from_cell(tank);
//!
//! branch.schedule_activity(
//!     activity(move |ctx| {
//!         ctx.emit(tank, -0.5);
//!         ctx.defer(10.seconds())?;
//!         ctx.emit(tank, 0.5);
//!         Ok(())
//!     }),
//!     branch.start(),
//! )?;
//! branch.run_to_quiescence()?;
//!
//! assert_eq!(Ok(5.0), branch.read(&fuel));
//! # Ok(())
//! # }
//! ```

#[doc(hidden)]
pub mod internal;
mod public;

pub use public::{activity, cell, effect, resource};

pub use crate::internal::debug::Diagnostics;
pub use crate::internal::history::{History, HistoryPoint};
pub use crate::public::activity::{
    Activity, ActivityDirective, Catalog, FnActivity, Interrupt, TaskContext, TaskId, TaskResult,
    TaskState, activity,
};
pub use crate::public::branch::{Branch, run_branches};
pub use crate::public::cell::builtins::{
    Accumulator, Counter, Latch, LinearIntegrator, Register, Toggle,
};
pub use crate::public::cell::{Cell, CellId, Effect};
pub use crate::public::config::SimulationConfig;
pub use crate::public::effect::{
    Arithmetic, Conjunction, Disjunction, EffectAlgebra, Max, Min, Product, SetOnce, Sum,
};
pub use crate::public::failure::{Failure, KernelError};
pub use crate::public::resource::dynamics::{Dynamics, Expiring, Expiry, Extrapolate};
pub use crate::public::resource::{Querier, Res, Resource, derived, from_cell, from_cell_with};
pub use crate::public::results::{
    Defect, ResourceReport, Segment, SimulationResults, TaskReport,
};
pub use crate::public::value::{ToValue, Value};
pub use anyhow::{Context, Error, Result, anyhow, bail};
pub use hifitime::{Duration, Epoch as Time, TimeUnits};
