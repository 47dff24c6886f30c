//! A reference target for the grax pipeline.
//!
//! This crate shows what a target supplies to the core: a scheduling model
//! ([RefModel]), an instruction compiler ([RefCompiler] producing [Kernel]
//! instructions), and the pass pipeline that wires them together. The
//! "device" is imaginary; its kernels are pseudo-source strings and its
//! streams are in-order queues, which is exactly enough to exercise the
//! pipeline end to end.

mod kernel;
mod model;

pub use kernel::Kernel;
pub use kernel::RefCompiler;
pub use model::RefModel;

use grax::compile::CompileOps;
use grax::opt::DeadCodeElimination;
use grax::opt::MemoryColoring;
use grax::opt::Schedule;
use grax::pass::Pass;
use grax::TransformOptions;
use std::sync::Arc;

/// The optimization pipeline of the reference target.
pub fn passes(model: Arc<RefModel>, options: &TransformOptions) -> Vec<Box<dyn Pass>> {
    vec![
        Box::new(MemoryColoring::with_options(options)),
        Box::new(Schedule::new(model)),
        Box::new(CompileOps::with_options(Arc::new(RefCompiler), options)),
        Box::new(DeadCodeElimination),
    ]
}
