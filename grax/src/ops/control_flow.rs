use crate::ir::ElementType;
use crate::ir::Module;
use crate::ir::Operator;
use crate::ir::Shape;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use std::any::Any;

/// Conditional execution of one of two child modules.
///
/// The first input is a scalar boolean condition; the remaining inputs are
/// forwarded to the selected child's parameters. Both children must produce
/// the same output shape, which becomes this instruction's shape. Child
/// modules here are single-output (see DESIGN.md).
#[derive(Clone, Debug)]
pub struct If;

impl Operator for If {
    fn name(&self) -> String {
        "if".to_string()
    }
    fn compute_shape(&self, inputs: Vec<Shape>, mods: &[Shared<Module>]) -> Result<Shape> {
        if mods.len() != 2 {
            anyhow::bail!("if: operator requires two child modules, got {}", mods.len());
        }
        let condition = inputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("if: missing condition input"))?;
        if condition.elem_type() != ElementType::Bool || !condition.is_scalar() {
            anyhow::bail!("if: condition must be a scalar bool, got {condition}");
        }
        let out0 = mods[0].rd().get_output_shapes();
        let out1 = mods[1].rd().get_output_shapes();
        if out0 != out1 {
            anyhow::bail!(
                "if: output shapes of child modules must match ({} vs {})",
                mods[0].rd().name(),
                mods[1].rd().name()
            );
        }
        out0.into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("if: child module {} has no outputs", mods[0].rd().name()))
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn clone_box(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }
}
