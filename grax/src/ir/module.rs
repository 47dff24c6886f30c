use crate::ir::Instruction;
use crate::ir::InstructionRef;
use crate::ir::IntoOperator;
use crate::ir::Shape;
use crate::ops::builtin::Param;
use crate::ops::builtin::Return;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use std::collections::HashMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

/// A stable identity for an instruction reference, usable as a map key.
pub fn ref_id(ins: &InstructionRef) -> usize {
    Arc::as_ptr(ins) as *const () as usize
}

/// A named, ordered instruction graph.
///
/// Program order is definition order: an instruction may only reference
/// instructions that appear earlier in the same module (or instructions of
/// an ancestor module, which this module cannot see). Formal parameters are
/// ordinary instructions using the `param` operator and stay at the front;
/// designated outputs use the `return` operator.
pub struct Module {
    name: String,
    instructions: Vec<InstructionRef>,
    /// A bypass module is a pure data container; the pass manager skips it
    /// during per-module traversal.
    bypass: bool,
}

impl Module {
    pub fn new(name: &str) -> Module {
        Module {
            name: name.to_string(),
            instructions: vec![],
            bypass: false,
        }
    }
    pub fn name(&self) -> String {
        self.name.clone()
    }
    pub fn bypass(&self) -> bool {
        self.bypass
    }
    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }
    pub fn instructions(&self) -> &[InstructionRef] {
        &self.instructions
    }
    pub fn len(&self) -> usize {
        self.instructions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
    /// The program-order position of an instruction in this module.
    pub fn position_of(&self, ins: &InstructionRef) -> Option<usize> {
        self.instructions
            .iter()
            .position(|other| Arc::ptr_eq(other, ins))
    }
    pub fn has_instruction(&self, ins: &InstructionRef) -> bool {
        self.position_of(ins).is_some()
    }

    fn push_at(
        &mut self,
        index: usize,
        op: Box<dyn crate::ir::Operator>,
        inputs: Vec<InstructionRef>,
        module_refs: Vec<Shared<Module>>,
    ) -> Result<InstructionRef> {
        let shapes = inputs.iter().map(|i| i.rd().shape().clone()).collect();
        let shape = op
            .compute_shape(shapes, &module_refs)
            .map_err(|e| anyhow::anyhow!("{}: {e}", op.name()))?;
        let ins = Shared::new(Instruction::new(op, shape, inputs, module_refs).into());
        self.instructions.insert(index, ins.clone());
        Ok(ins)
    }

    /// Append an instruction after all existing instructions.
    ///
    /// The output shape is computed by the operator; a malformed input
    /// combination is rejected here.
    pub fn add_instruction(
        &mut self,
        op: impl IntoOperator,
        inputs: Vec<InstructionRef>,
    ) -> Result<InstructionRef> {
        self.add_instruction_with_modules(op, inputs, vec![])
    }
    /// Append an instruction that references child modules.
    pub fn add_instruction_with_modules(
        &mut self,
        op: impl IntoOperator,
        inputs: Vec<InstructionRef>,
        module_refs: Vec<Shared<Module>>,
    ) -> Result<InstructionRef> {
        self.push_at(self.instructions.len(), op.into_operator(), inputs, module_refs)
    }
    /// Insert an instruction immediately before `target`.
    pub fn insert_before(
        &mut self,
        target: &InstructionRef,
        op: impl IntoOperator,
        inputs: Vec<InstructionRef>,
    ) -> Result<InstructionRef> {
        let index = self
            .position_of(target)
            .ok_or_else(|| anyhow::anyhow!("insert_before: target not in module {}", self.name))?;
        self.push_at(index, op.into_operator(), inputs, vec![])
    }
    /// Insert an instruction immediately after `target`.
    pub fn insert_after(
        &mut self,
        target: &InstructionRef,
        op: impl IntoOperator,
        inputs: Vec<InstructionRef>,
    ) -> Result<InstructionRef> {
        let index = self
            .position_of(target)
            .ok_or_else(|| anyhow::anyhow!("insert_after: target not in module {}", self.name))?;
        self.push_at(index + 1, op.into_operator(), inputs, vec![])
    }

    /// Add a formal parameter. Parameters keep their creation order and stay
    /// in front of every non-parameter instruction.
    pub fn add_parameter(&mut self, name: &str, shape: Shape) -> InstructionRef {
        let index = self
            .instructions
            .iter()
            .take_while(|ins| ins.rd().is::<Param>())
            .count();
        let op = Box::new(Param {
            name: name.to_string(),
        });
        let ins = Shared::new(Instruction::new(op, shape, vec![], vec![]).into());
        self.instructions.insert(index, ins.clone());
        ins
    }
    /// Designate the module outputs by appending a `return` instruction.
    pub fn add_return(&mut self, args: Vec<InstructionRef>) -> Result<InstructionRef> {
        self.add_instruction(Return, args)
    }

    /// Rewrite an instruction in place, preserving its identity so input
    /// references held by later instructions stay valid. The output shape is
    /// recomputed from the new operator and inputs.
    pub fn replace_instruction(
        &mut self,
        ins: &InstructionRef,
        op: impl IntoOperator,
        inputs: Vec<InstructionRef>,
    ) -> Result<()> {
        if !self.has_instruction(ins) {
            anyhow::bail!("replace_instruction: target not in module {}", self.name);
        }
        let op = op.into_operator();
        let shapes = inputs.iter().map(|i| i.rd().shape().clone()).collect();
        let module_refs = ins.rd().module_refs().to_vec();
        let shape = op
            .compute_shape(shapes, &module_refs)
            .map_err(|e| anyhow::anyhow!("{}: {e}", op.name()))?;
        ins.wr().replace(op, shape, inputs);
        Ok(())
    }

    /// Remove an instruction. Fails while any remaining instruction in this
    /// module still references it (run dead-code elimination first). The
    /// removed instruction is tombstoned so that a reference held elsewhere
    /// is detectable as dangling.
    pub fn erase(&mut self, ins: &InstructionRef) -> Result<()> {
        let index = self
            .position_of(ins)
            .ok_or_else(|| anyhow::anyhow!("erase: target not in module {}", self.name))?;
        for other in &self.instructions {
            if Arc::ptr_eq(other, ins) {
                continue;
            }
            let other = other.rd();
            if other.inputs().iter().any(|input| Arc::ptr_eq(input, ins)) {
                anyhow::bail!(
                    "erase: instruction {} at position {index} still has users in module {}",
                    ins.rd().name(),
                    self.name
                );
            }
        }
        self.instructions.remove(index);
        ins.wr().set_erased();
        Ok(())
    }

    /// Check structural validity: every input must reference a live
    /// instruction strictly earlier in this module (references that resolve
    /// outside this module belong to an ancestor and cannot be checked
    /// here). Returns the position of the first invalid instruction, or
    /// `None` when the module is well-formed. Read-only.
    pub fn validate(&self) -> Option<usize> {
        let mut positions: HashMap<usize, usize> = HashMap::new();
        for (index, ins) in self.instructions.iter().enumerate() {
            positions.insert(ref_id(ins), index);
        }
        for (index, ins) in self.instructions.iter().enumerate() {
            for input in ins.rd().inputs() {
                if Arc::ptr_eq(input, ins) {
                    return Some(index);
                }
                if input.rd().is_erased() {
                    return Some(index);
                }
                if let Some(&def) = positions.get(&ref_id(input)) {
                    if def >= index {
                        return Some(index);
                    }
                }
            }
        }
        None
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.instructions
            .iter()
            .filter_map(|ins| ins.rd().downcast::<Param>().map(|p| p.name.clone()))
            .collect()
    }
    pub fn get_parameter(&self, name: &str) -> Option<InstructionRef> {
        self.instructions
            .iter()
            .find(|ins| {
                ins.rd()
                    .downcast::<Param>()
                    .map(|p| p.name == name)
                    .unwrap_or(false)
            })
            .cloned()
    }
    pub fn get_returns(&self) -> Vec<InstructionRef> {
        self.instructions
            .iter()
            .filter(|ins| ins.rd().is::<Return>())
            .cloned()
            .collect()
    }
    /// The shapes this module produces: the shapes of the `return` operands,
    /// or the shape of the last instruction when no return is designated.
    pub fn get_output_shapes(&self) -> Vec<Shape> {
        if let Some(last) = self.instructions.last() {
            let last = last.rd();
            if last.is::<Return>() {
                return last.inputs().iter().map(|i| i.rd().shape().clone()).collect();
            }
            return vec![last.shape().clone()];
        }
        vec![]
    }
    /// Child modules referenced by control-flow instructions, deduplicated,
    /// in first-reference order.
    pub fn referenced_modules(&self) -> Vec<Shared<Module>> {
        let mut seen: Vec<Shared<Module>> = vec![];
        for ins in &self.instructions {
            for child in ins.rd().module_refs() {
                if !seen.iter().any(|m| Arc::ptr_eq(m, child)) {
                    seen.push(child.clone());
                }
            }
        }
        seen
    }

    /// Stable value names for printing: parameters keep their name, every
    /// other buffer-producing instruction is numbered in program order.
    fn value_names(&self) -> HashMap<usize, String> {
        let mut names = HashMap::new();
        let mut counter = 0;
        for ins in &self.instructions {
            let guard = ins.rd();
            if let Some(param) = guard.downcast::<Param>() {
                names.insert(ref_id(ins), format!("%{}", param.name));
            } else if !guard.shape().is_none() {
                names.insert(ref_id(ins), format!("%{counter}"));
                counter += 1;
            }
        }
        names
    }
    pub fn display(&self, f: &mut Formatter<'_>, indent: i32) -> std::fmt::Result {
        let spaces = crate::ir::spaces(indent);
        let names = self.value_names();
        let params = self
            .instructions
            .iter()
            .filter(|ins| ins.rd().is::<Param>())
            .map(|ins| format!("%{} : {}", ins.rd().downcast::<Param>().unwrap().name, ins.rd().shape()))
            .collect::<Vec<String>>()
            .join(", ");
        writeln!(f, "{spaces}{}({params}) {{", self.name)?;
        let body_spaces = crate::ir::spaces(indent + 1);
        for ins in &self.instructions {
            let guard = ins.rd();
            if guard.is::<Param>() {
                continue;
            }
            write!(f, "{body_spaces}")?;
            if let Some(name) = names.get(&ref_id(ins)) {
                write!(f, "{name} = ")?;
            }
            write!(f, "{}", guard.name())?;
            let attributes = guard.operator().attributes();
            if !attributes.is_empty() {
                write!(f, "{attributes}")?;
            }
            if !guard.inputs().is_empty() {
                let inputs = guard
                    .inputs()
                    .iter()
                    .map(|input| {
                        names
                            .get(&ref_id(input))
                            .cloned()
                            // A reference into an ancestor module has no
                            // local name.
                            .unwrap_or_else(|| "%^".to_string())
                    })
                    .collect::<Vec<String>>()
                    .join(", ");
                write!(f, "({inputs})")?;
            }
            if !guard.module_refs().is_empty() {
                let mods = guard
                    .module_refs()
                    .iter()
                    .map(|m| m.rd().name())
                    .collect::<Vec<String>>()
                    .join(", ");
                write!(f, " [{mods}]")?;
            }
            if !guard.shape().is_none() {
                write!(f, " : {}", guard.shape())?;
            }
            writeln!(f)?;
        }
        writeln!(f, "{spaces}}}")
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f, 0)
    }
}
