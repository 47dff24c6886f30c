//! Two-phase parallel compilation of operator kernels.
//!
//! Compiling a kernel description into an executable artifact is a pure
//! function of one instruction's operator and shapes, so a batch of them can
//! run concurrently. Mutating the graph is not safe under concurrent
//! writers, so the mutation is split off: workers produce replacement
//! callbacks into per-job slots, and a single-threaded commit phase applies
//! them sequentially afterwards. A reader of the IR between the phases sees
//! either the fully-original or fully-mutated module, never a partial state.

use crate::ir::Attribute;
use crate::ir::Attributes;
use crate::ir::InstructionRef;
use crate::ir::Module;
use crate::ir::Operator;
use crate::ir::Shape;
use crate::pass::ModulePassManager;
use crate::pass::Pass;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::transform::TransformOptions;
use anyhow::Result;
use rayon::prelude::*;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// Wraps an operator whose kernel has not been compiled yet.
///
/// By the device convention the trailing input is the caller-provided output
/// buffer; the wrapper's output aliases it, and shape inference runs the
/// inner operator on the remaining inputs.
#[derive(Clone)]
pub struct Precompile {
    pub op: Box<dyn Operator>,
}

impl Operator for Precompile {
    fn name(&self) -> String {
        "precompile".to_string()
    }
    fn compute_shape(&self, mut inputs: Vec<Shape>, mods: &[Shared<Module>]) -> Result<Shape> {
        if inputs.pop().is_none() {
            anyhow::bail!("precompile: missing trailing output buffer");
        }
        self.op.compute_shape(inputs, mods)
    }
    fn attributes(&self) -> Attributes {
        Attributes::new().with("op", Attribute::Str(self.op.name()))
    }
    fn output_alias(&self, inputs: &[Shape]) -> Option<usize> {
        inputs.len().checked_sub(1)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn clone_box(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }
}

/// The commit callback a device compiler returns: invoked with the module
/// and the compiled instruction, it performs the in-place graph mutation
/// that installs the artifact.
pub struct CompilerReplace(
    Box<dyn FnOnce(&Shared<Module>, &InstructionRef) -> Result<()> + Send>,
);

impl CompilerReplace {
    pub fn new(
        replace: impl FnOnce(&Shared<Module>, &InstructionRef) -> Result<()> + Send + 'static,
    ) -> CompilerReplace {
        CompilerReplace(Box::new(replace))
    }
    fn apply(self, module: &Shared<Module>, ins: &InstructionRef) -> Result<()> {
        (self.0)(module, ins)
    }
}

/// The device-compiler collaborator.
pub trait InstructionCompiler: Send + Sync {
    /// Compile one instruction into an executable artifact plus its commit
    /// callback. Must be read-only: the IR may be read, never mutated; the
    /// mutation happens when the returned callback runs in the commit phase.
    fn compile(&self, ins: &InstructionRef) -> Result<CompilerReplace>;
}

struct CompiledResult {
    replace: CompilerReplace,
    ins: InstructionRef,
}

/// Compiles every `precompile` instruction of a module, in parallel, then
/// commits the results serially in program order.
///
/// The worker pool is bounded: `jobs / divisor` workers (at least one), with
/// the divisor taken from [TransformOptions::compile_parallelism]. One
/// failed job aborts the whole batch before any commit is applied.
pub struct CompileOps {
    compiler: Arc<dyn InstructionCompiler>,
    divisor: usize,
}

impl CompileOps {
    pub fn new(compiler: Arc<dyn InstructionCompiler>) -> CompileOps {
        CompileOps {
            compiler,
            divisor: 1,
        }
    }
    pub fn with_options(
        compiler: Arc<dyn InstructionCompiler>,
        options: &TransformOptions,
    ) -> CompileOps {
        CompileOps {
            compiler,
            divisor: options.compile_parallelism.max(1),
        }
    }
}

impl Pass for CompileOps {
    fn name(&self) -> &str {
        "compile_ops"
    }
    fn apply(&self, mpm: &mut ModulePassManager) -> Result<()> {
        let module = mpm.module();
        let jobs: Vec<InstructionRef> = module
            .rd()
            .instructions()
            .iter()
            .filter(|ins| ins.rd().is::<Precompile>())
            .cloned()
            .collect();
        if jobs.is_empty() {
            return Ok(());
        }
        let workers = (jobs.len() / self.divisor).max(1);
        debug!(
            "compile_ops: {} jobs on {workers} workers in module {}",
            jobs.len(),
            module.rd().name()
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()?;
        // Collecting into Result is the pre-sized write-once slot per job:
        // results land in job order, and the first error aborts the batch
        // with nothing committed.
        let results: Result<Vec<CompiledResult>> = pool.install(|| {
            jobs.par_iter()
                .map(|ins| {
                    self.compiler.compile(ins).map(|replace| CompiledResult {
                        replace,
                        ins: ins.clone(),
                    })
                })
                .collect()
        });
        for result in results? {
            result.replace.apply(&module, &result.ins)?;
        }
        Ok(())
    }
}
