use crate::ir::ref_id;
use crate::ir::InstructionRef;
use crate::ir::Module;
use crate::ops::builtin::Param;
use crate::pass::ModulePassManager;
use crate::pass::Pass;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use std::sync::Arc;

/// Erases instructions whose results are never read.
///
/// Visits the module in reverse program order so that a dead chain
/// disappears in one sweep. Parameters, side-effecting instructions, and
/// instructions still referenced from a descendant module are kept: an
/// instruction of this module can be captured directly as an input inside a
/// child module, which a module-local user scan would miss.
pub struct DeadCodeElimination;

fn descendants(module: &Shared<Module>) -> Vec<Shared<Module>> {
    let mut out = vec![];
    let mut stack = module.rd().referenced_modules();
    while let Some(child) = stack.pop() {
        if out.iter().any(|m: &Shared<Module>| Arc::ptr_eq(m, &child)) {
            continue;
        }
        stack.extend(child.rd().referenced_modules());
        out.push(child);
    }
    out
}

fn has_users(module: &Shared<Module>, descendants: &[Shared<Module>], ins: &InstructionRef) -> bool {
    let id = ref_id(ins);
    let uses_it = |m: &Shared<Module>| {
        m.rd().instructions().iter().any(|other| {
            !Arc::ptr_eq(other, ins) && other.rd().inputs().iter().any(|input| ref_id(input) == id)
        })
    };
    uses_it(module) || descendants.iter().any(uses_it)
}

impl Pass for DeadCodeElimination {
    fn name(&self) -> &str {
        "dead_code_elimination"
    }
    fn apply(&self, mpm: &mut ModulePassManager) -> Result<()> {
        let module = mpm.module();
        let descendants = descendants(&module);
        let snapshot = module.rd().instructions().to_vec();
        for ins in snapshot.iter().rev() {
            let keep = {
                let guard = ins.rd();
                guard.is::<Param>() || guard.operator().has_side_effects()
            };
            if keep {
                continue;
            }
            if !has_users(&module, &descendants, ins) {
                module.wr().erase(ins)?;
            }
        }
        Ok(())
    }
}
