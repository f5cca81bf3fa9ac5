//! Engine internals: the cell arena, history, task records, scheduler queues, and the
//! diagnostics side table. Nothing here is part of the stable API.

pub mod arena;
pub mod clock;
pub mod debug;
pub mod history;
pub mod scheduler;
pub mod task;
