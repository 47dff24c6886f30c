use crate::ir::expect_arity;
use crate::ir::Attribute;
use crate::ir::Attributes;
use crate::ir::Module;
use crate::ir::Operator;
use crate::ir::Shape;
use crate::shared::Shared;
use anyhow::Result;
use std::any::Any;

/// Blocks the owning stream until the event has been signaled.
///
/// Inserted by scheduling models immediately before the consumer of a
/// cross-stream dependency edge.
#[derive(Clone, Debug)]
pub struct Wait {
    pub event: u64,
}

impl Operator for Wait {
    fn name(&self) -> String {
        "wait".to_string()
    }
    fn compute_shape(&self, inputs: Vec<Shape>, _mods: &[Shared<Module>]) -> Result<Shape> {
        expect_arity("wait", &inputs, 0)?;
        Ok(Shape::none())
    }
    fn attributes(&self) -> Attributes {
        Attributes::new().with("event", Attribute::Size(self.event as usize))
    }
    fn has_side_effects(&self) -> bool {
        true
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn clone_box(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }
}

/// Signals the event once the preceding instruction completes.
#[derive(Clone, Debug)]
pub struct Record {
    pub event: u64,
}

impl Operator for Record {
    fn name(&self) -> String {
        "record".to_string()
    }
    fn compute_shape(&self, inputs: Vec<Shape>, _mods: &[Shared<Module>]) -> Result<Shape> {
        expect_arity("record", &inputs, 0)?;
        Ok(Shape::none())
    }
    fn attributes(&self) -> Attributes {
        Attributes::new().with("event", Attribute::Size(self.event as usize))
    }
    fn has_side_effects(&self) -> bool {
        true
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn clone_box(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }
}
