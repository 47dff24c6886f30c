use crate::ir::expect_arity;
use crate::ir::expect_same;
use crate::ir::Attribute;
use crate::ir::Attributes;
use crate::ir::Module;
use crate::ir::Operator;
use crate::ir::Shape;
use crate::shared::Shared;
use anyhow::Result;
use std::any::Any;

/// A formal parameter of a module. The shape is fixed when the parameter is
/// added; shape inference is never called for it.
#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
}

impl Operator for Param {
    fn name(&self) -> String {
        "param".to_string()
    }
    fn compute_shape(&self, _inputs: Vec<Shape>, _mods: &[Shared<Module>]) -> Result<Shape> {
        anyhow::bail!("param: shape is fixed at creation")
    }
    fn attributes(&self) -> Attributes {
        Attributes::new().with("name", Attribute::Str(self.name.clone()))
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn clone_box(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }
}

/// Designates the module outputs. Produces no buffer.
#[derive(Clone, Debug)]
pub struct Return;

impl Operator for Return {
    fn name(&self) -> String {
        "return".to_string()
    }
    fn compute_shape(&self, _inputs: Vec<Shape>, _mods: &[Shared<Module>]) -> Result<Shape> {
        Ok(Shape::none())
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

/// A compile-time constant with its backing bytes.
#[derive(Clone, Debug)]
pub struct Literal {
    shape: Shape,
    data: Vec<u8>,
}

impl Literal {
    pub fn new(shape: Shape, data: Vec<u8>) -> Result<Literal> {
        if data.len() != shape.bytes() {
            anyhow::bail!(
                "literal: {} bytes of data for shape {shape} ({} bytes)",
                data.len(),
                shape.bytes()
            );
        }
        Ok(Literal { shape, data })
    }
    pub fn zeros(shape: Shape) -> Literal {
        let data = vec![0; shape.bytes()];
        Literal { shape, data }
    }
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Operator for Literal {
    fn name(&self) -> String {
        "literal".to_string()
    }
    fn compute_shape(&self, inputs: Vec<Shape>, _mods: &[Shared<Module>]) -> Result<Shape> {
        expect_arity("literal", &inputs, 0)?;
        Ok(self.shape.clone())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn clone_box(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }
}

/// Passes its single input through unchanged.
#[derive(Clone, Debug)]
pub struct Identity;

impl Operator for Identity {
    fn name(&self) -> String {
        "identity".to_string()
    }
    fn compute_shape(&self, inputs: Vec<Shape>, _mods: &[Shared<Module>]) -> Result<Shape> {
        expect_arity("identity", &inputs, 1)?;
        Ok(inputs[0].clone())
    }
    fn output_alias(&self, _inputs: &[Shape]) -> Option<usize> {
        Some(0)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn clone_box(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }
}

/// Elementwise addition of two same-shaped inputs.
#[derive(Clone, Debug)]
pub struct Add;

impl Operator for Add {
    fn name(&self) -> String {
        "add".to_string()
    }
    fn compute_shape(&self, inputs: Vec<Shape>, _mods: &[Shared<Module>]) -> Result<Shape> {
        expect_arity("add", &inputs, 2)?;
        expect_same("add", &inputs)?;
        Ok(inputs[0].clone())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn clone_box(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }
}

/// Elementwise multiplication of two same-shaped inputs.
#[derive(Clone, Debug)]
pub struct Mul;

impl Operator for Mul {
    fn name(&self) -> String {
        "mul".to_string()
    }
    fn compute_shape(&self, inputs: Vec<Shape>, _mods: &[Shared<Module>]) -> Result<Shape> {
        expect_arity("mul", &inputs, 2)?;
        expect_same("mul", &inputs)?;
        Ok(inputs[0].clone())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn clone_box(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }
}

/// Inserts size-one dimensions at the given output axes.
///
/// Strides are carried over from the input so the result is still a view;
/// an inserted axis takes the stride that keeps the view consistent with
/// its neighbors.
#[derive(Clone, Debug)]
pub struct Unsqueeze {
    pub axes: Vec<i64>,
}

impl Operator for Unsqueeze {
    fn name(&self) -> String {
        "unsqueeze".to_string()
    }
    fn compute_shape(&self, inputs: Vec<Shape>, _mods: &[Shared<Module>]) -> Result<Shape> {
        expect_arity("unsqueeze", &inputs, 1)?;
        let input = &inputs[0];
        let old_lens = input.lens();
        let old_strides = input.strides();
        if input.is_scalar() {
            return Ok(input.clone());
        }
        if old_lens.is_empty() {
            anyhow::bail!("unsqueeze: input produces no buffer");
        }
        let new_size = old_lens.len() + self.axes.len();
        let mut axes = Vec::with_capacity(self.axes.len());
        for &axis in &self.axes {
            let normalized = if axis < 0 {
                axis + new_size as i64
            } else {
                axis
            };
            if normalized < 0 || normalized >= new_size as i64 {
                anyhow::bail!("unsqueeze: axis {axis} out of range for rank {new_size}");
            }
            if axes.contains(&(normalized as usize)) {
                anyhow::bail!("unsqueeze: duplicate axis {axis}");
            }
            axes.push(normalized as usize);
        }
        let mut new_lens = vec![0; new_size];
        let mut new_strides = vec![0; new_size];
        let mut p = 0;
        for i in 0..new_size {
            if axes.contains(&i) {
                new_lens[i] = 1;
                new_strides[i] = if p == 0 {
                    old_lens[0] * old_strides[0]
                } else if p < old_strides.len() {
                    old_strides[p - 1]
                } else {
                    1
                };
            } else {
                new_lens[i] = old_lens[p];
                new_strides[i] = old_strides[p];
                p += 1;
            }
        }
        Ok(Shape::with_strides(
            input.elem_type(),
            new_lens,
            new_strides,
        ))
    }
    fn attributes(&self) -> Attributes {
        Attributes::new().with("axes", Attribute::Ints(self.axes.clone()))
    }
    fn output_alias(&self, _inputs: &[Shape]) -> Option<usize> {
        Some(0)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn clone_box(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }
}

/// Repacks a non-standard view into a packed, row-major buffer.
#[derive(Clone, Debug)]
pub struct Contiguous;

impl Operator for Contiguous {
    fn name(&self) -> String {
        "contiguous".to_string()
    }
    fn compute_shape(&self, inputs: Vec<Shape>, _mods: &[Shared<Module>]) -> Result<Shape> {
        expect_arity("contiguous", &inputs, 1)?;
        Ok(inputs[0].packed())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn clone_box(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }
}

/// Requests a scratch buffer of the given shape.
///
/// Memory coloring rewrites these into views of one shared arena.
#[derive(Clone, Debug)]
pub struct Allocate {
    pub shape: Shape,
}

impl Operator for Allocate {
    fn name(&self) -> String {
        "allocate".to_string()
    }
    fn compute_shape(&self, inputs: Vec<Shape>, _mods: &[Shared<Module>]) -> Result<Shape> {
        expect_arity("allocate", &inputs, 0)?;
        Ok(self.shape.clone())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn clone_box(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }
}

/// A bounds-checked sub-view into a backing buffer, at a byte offset.
#[derive(Clone, Debug)]
pub struct Load {
    pub offset: usize,
    pub shape: Shape,
}

impl Operator for Load {
    fn name(&self) -> String {
        "load".to_string()
    }
    fn compute_shape(&self, inputs: Vec<Shape>, _mods: &[Shared<Module>]) -> Result<Shape> {
        expect_arity("load", &inputs, 1)?;
        let end = self.offset + self.shape.bytes();
        if end > inputs[0].bytes() {
            anyhow::bail!(
                "load: view [{}, {end}) does not fit in {} bytes",
                self.offset,
                inputs[0].bytes()
            );
        }
        Ok(self.shape.clone())
    }
    fn attributes(&self) -> Attributes {
        Attributes::new().with("offset", Attribute::Size(self.offset))
    }
    fn output_alias(&self, _inputs: &[Shape]) -> Option<usize> {
        Some(0)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn clone_box(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }
}
