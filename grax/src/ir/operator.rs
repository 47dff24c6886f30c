use crate::ir::Attributes;
use crate::ir::Module;
use crate::ir::Shape;
use crate::shared::Shared;
use anyhow::Result;
use std::any::Any;

/// The capability set every operator implements.
///
/// An operator is a stateless descriptor: its configuration lives in plain
/// struct fields, and its behavior is exposed through this trait. Shape
/// inference may reject malformed input combinations; execution is the
/// concern of a downstream executor and is not part of this trait.
pub trait Operator: Send + Sync {
    /// The operator name as printed in the IR.
    fn name(&self) -> String;
    /// Compute the output shape from the input shapes and child modules.
    fn compute_shape(&self, inputs: Vec<Shape>, mods: &[Shared<Module>]) -> Result<Shape>;
    /// Printable attributes, empty by default.
    fn attributes(&self) -> Attributes {
        Attributes::new()
    }
    /// Whether the instruction must be kept even without users (e.g.,
    /// synchronization markers).
    fn has_side_effects(&self) -> bool {
        false
    }
    /// The input index the output buffer aliases, if any.
    ///
    /// An operator that writes through a caller-provided buffer (passed as
    /// its last input, as the device convention goes) reports that index so
    /// liveness analysis can follow the buffer to its true last reader.
    fn output_alias(&self, _inputs: &[Shape]) -> Option<usize> {
        None
    }
    fn as_any(&self) -> &dyn Any;
    fn clone_box(&self) -> Box<dyn Operator>;
}

impl Clone for Box<dyn Operator> {
    fn clone(&self) -> Box<dyn Operator> {
        self.clone_box()
    }
}

/// Conversion into a boxed operator, so the module API accepts both concrete
/// operator values and already-boxed ones.
pub trait IntoOperator {
    fn into_operator(self) -> Box<dyn Operator>;
}

impl<O: Operator + 'static> IntoOperator for O {
    fn into_operator(self) -> Box<dyn Operator> {
        Box::new(self)
    }
}

impl IntoOperator for Box<dyn Operator> {
    fn into_operator(self) -> Box<dyn Operator> {
        self
    }
}

/// Reject a wrong operand count during shape inference.
pub fn expect_arity(name: &str, inputs: &[Shape], arity: usize) -> Result<()> {
    if inputs.len() != arity {
        anyhow::bail!(
            "{name}: expected {arity} input(s), got {}",
            inputs.len()
        );
    }
    Ok(())
}

/// Reject inputs whose lengths or element types differ.
pub fn expect_same(name: &str, inputs: &[Shape]) -> Result<()> {
    let first = match inputs.first() {
        Some(first) => first,
        None => return Ok(()),
    };
    for input in inputs.iter().skip(1) {
        if input.lens() != first.lens() || input.elem_type() != first.elem_type() {
            anyhow::bail!("{name}: mismatched input shapes {first} and {input}");
        }
    }
    Ok(())
}
