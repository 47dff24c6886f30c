use crate::ir::Module;
use crate::ir::Operator;
use crate::ir::Shape;
use crate::shared::Shared;

/// A reference to an instruction held by the owning module or by other
/// instructions as an input.
///
/// Identity is the pointer: rewriting an instruction in place (see
/// [Module::replace_instruction](crate::ir::Module::replace_instruction))
/// keeps every outstanding reference valid.
pub type InstructionRef = Shared<Instruction>;

/// One node of the instruction graph.
///
/// Inputs are references, not owned: they point at instructions earlier in
/// the same module or, for instructions inside a child module, at
/// instructions of an ancestor module. Module references point at child
/// modules of control-flow operators.
pub struct Instruction {
    operator: Box<dyn Operator>,
    shape: Shape,
    inputs: Vec<InstructionRef>,
    module_refs: Vec<Shared<Module>>,
    /// Set when the owning module erases this instruction. A reference that
    /// is still dereferenced afterwards is a dangling reference, which
    /// `validate` reports.
    erased: bool,
}

impl Instruction {
    pub fn new(
        operator: Box<dyn Operator>,
        shape: Shape,
        inputs: Vec<InstructionRef>,
        module_refs: Vec<Shared<Module>>,
    ) -> Instruction {
        Instruction {
            operator,
            shape,
            inputs,
            module_refs,
            erased: false,
        }
    }
    pub fn name(&self) -> String {
        self.operator.name()
    }
    pub fn operator(&self) -> &dyn Operator {
        self.operator.as_ref()
    }
    pub fn shape(&self) -> &Shape {
        &self.shape
    }
    pub fn inputs(&self) -> &[InstructionRef] {
        &self.inputs
    }
    pub fn module_refs(&self) -> &[Shared<Module>] {
        &self.module_refs
    }
    pub fn is_erased(&self) -> bool {
        self.erased
    }
    /// Downcast the operator to a concrete type.
    pub fn downcast<O: Operator + 'static>(&self) -> Option<&O> {
        self.operator.as_any().downcast_ref::<O>()
    }
    pub fn is<O: Operator + 'static>(&self) -> bool {
        self.downcast::<O>().is_some()
    }
    pub(crate) fn replace(
        &mut self,
        operator: Box<dyn Operator>,
        shape: Shape,
        inputs: Vec<InstructionRef>,
    ) {
        self.operator = operator;
        self.shape = shape;
        self.inputs = inputs;
    }
    pub(crate) fn set_erased(&mut self) {
        self.erased = true;
    }
}
