//! Grax is the optimization-pipeline core of a dataflow-graph compiler.
//!
//! A compiler for computational dataflow graphs spends most of its life
//! running transformation passes: it takes a graph of operations, and pass
//! by pass rewrites it into a form a target device can execute.
//! This crate provides the infrastructure that keeps that tractable and
//! correct across many independent passes:
//!
//! - an [ir] of shape-typed instructions, grouped into named modules that
//!   form a tree through the child references of control-flow operations;
//! - a pass driver ([transform]) that applies passes bottom-up over the
//!   module tree, with optional validation after every step and a tracing
//!   side channel;
//! - a memory coloring pass ([opt::MemoryColoring]) that packs scratch
//!   buffers with disjoint lifetimes into one shared arena;
//! - a generic scheduler ([opt::Schedule]) that partitions instructions
//!   across concurrent streams behind a pluggable
//!   [opt::SchedulingModel] and inserts explicit synchronization;
//! - a two-phase parallel kernel compiler ([compile]) that evaluates
//!   per-instruction compilations concurrently and commits the resulting
//!   graph mutations serially.
//!
//! Targets plug in at the seams: they supply operators (shape inference plus
//! an execution contract consumed elsewhere), a scheduling model, and an
//! instruction compiler. The `grax-ref` crate in this workspace is a small
//! reference target showing all three.

pub mod compile;
pub mod ir;
pub mod ops;
pub mod opt;
pub mod pass;
pub mod shared;
#[cfg(feature = "test-utils")]
pub mod tester;
mod transform;

pub use transform::default_arguments;
pub use transform::init_subscriber;
pub use transform::run_passes;
pub use transform::run_passes_on_module;
pub use transform::Tracer;
pub use transform::TransformOptions;
