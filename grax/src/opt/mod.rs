//! Optimization passes over the IR.
//!
//! Each pass implements [Pass](crate::pass::Pass) and is driven by
//! [run_passes](crate::transform::run_passes). Memory coloring and
//! scheduling are the heavy lifters; dead-code elimination is the
//! prerequisite for erasing instructions whose users have been rewritten
//! away.

mod dce;
mod memory_coloring;
mod schedule;

pub use dce::DeadCodeElimination;
pub use memory_coloring::MemoryColoring;
pub use schedule::Schedule;
pub use schedule::SchedulingModel;
