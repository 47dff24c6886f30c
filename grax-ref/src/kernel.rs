use anyhow::Result;
use grax::compile::CompilerReplace;
use grax::compile::InstructionCompiler;
use grax::compile::Precompile;
use grax::ir::Attribute;
use grax::ir::Attributes;
use grax::ir::InstructionRef;
use grax::ir::Module;
use grax::ir::Operator;
use grax::ir::Shape;
use grax::shared::Shared;
use grax::shared::SharedExt;
use std::any::Any;

/// A compiled kernel of the reference target.
///
/// Carries the generated source so tests and the tracer can see what the
/// "device compiler" produced. Like every device operator it writes through
/// the caller-provided buffer passed as its last input.
#[derive(Clone, Debug)]
pub struct Kernel {
    pub kernel_name: String,
    pub source: String,
}

impl Operator for Kernel {
    fn name(&self) -> String {
        "ref::kernel".to_string()
    }
    fn compute_shape(&self, inputs: Vec<Shape>, _mods: &[Shared<Module>]) -> Result<Shape> {
        inputs
            .last()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("ref::kernel: missing output buffer"))
    }
    fn attributes(&self) -> Attributes {
        Attributes::new().with("kernel", Attribute::Str(self.kernel_name.clone()))
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

/// The expression a pointwise operator computes per element.
fn pointwise_expr(op: &str) -> Option<&'static str> {
    match op {
        "add" => Some("x[i] + y[i]"),
        "mul" => Some("x[i] * y[i]"),
        "identity" => Some("x[i]"),
        _ => None,
    }
}

/// Renders the pseudo-source of one pointwise kernel.
fn pointwise_source(name: &str, expr: &str, elements: usize) -> String {
    format!(
        "kernel {name}(x, y, out) {{\n  for i in 0..{elements} {{ out[i] = {expr}; }}\n}}\n"
    )
}

/// The instruction compiler of the reference target.
///
/// Compiles `precompile`-wrapped pointwise operators into [Kernel]
/// instructions. Compilation reads the instruction only; the graph mutation
/// happens in the returned commit callback.
pub struct RefCompiler;

impl InstructionCompiler for RefCompiler {
    fn compile(&self, ins: &InstructionRef) -> Result<CompilerReplace> {
        let (inner, elements) = {
            let guard = ins.rd();
            let precompile = guard
                .downcast::<Precompile>()
                .ok_or_else(|| anyhow::anyhow!("ref: cannot compile {}", guard.name()))?;
            (precompile.op.name(), guard.shape().elements())
        };
        let expr = pointwise_expr(&inner)
            .ok_or_else(|| anyhow::anyhow!("ref: no pointwise lowering for {inner}"))?;
        let kernel_name = format!("{inner}_{elements}");
        let kernel = Kernel {
            source: pointwise_source(&kernel_name, expr, elements),
            kernel_name,
        };
        Ok(CompilerReplace::new(move |module, ins| {
            let inputs = ins.rd().inputs().to_vec();
            module.wr().replace_instruction(ins, kernel, inputs)
        }))
    }
}
