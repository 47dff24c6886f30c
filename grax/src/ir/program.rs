use crate::ir::Module;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use std::collections::HashMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

/// The parent relation of the module tree.
///
/// Built from the child-module references of control-flow instructions.
/// Construction rejects cycles; the single-parent invariant is enforced by
/// the pass driver, which fails fast when more than one parent is found.
pub struct ModuleTree {
    parents: HashMap<String, Vec<Shared<Module>>>,
}

impl ModuleTree {
    pub fn parents_of(&self, module: &Shared<Module>) -> &[Shared<Module>] {
        self.parents
            .get(&module.rd().name())
            .map(|parents| parents.as_slice())
            .unwrap_or(&[])
    }
}

/// Owns every module of one compilation, with `main` as the entry module.
///
/// The program is the factory for new modules: passes that split out shared
/// subgraphs request creation here so the module outlives the pass.
pub struct Program {
    /// Creation order; `main` is always first.
    modules: Vec<Shared<Module>>,
}

impl Program {
    pub fn new() -> Program {
        Program {
            modules: vec![Shared::new(Module::new("main").into())],
        }
    }
    pub fn main(&self) -> Shared<Module> {
        self.modules[0].clone()
    }
    pub fn get_module(&self, name: &str) -> Option<Shared<Module>> {
        self.modules.iter().find(|m| m.rd().name() == name).cloned()
    }
    /// Allocate a new, empty module owned by this program for its lifetime.
    pub fn create_module(&mut self, name: &str) -> Result<Shared<Module>> {
        if self.get_module(name).is_some() {
            anyhow::bail!("create_module: a module named {name} already exists");
        }
        let module = Shared::new(Module::new(name).into());
        self.modules.push(module.clone());
        Ok(module)
    }

    /// Every module in a stable order: a preorder walk from `main` following
    /// child references (so a parent always precedes its children), then any
    /// unreferenced module in creation order. Visiting this in reverse gives
    /// the bottom-up order the pass driver needs.
    pub fn get_modules(&self) -> Vec<Shared<Module>> {
        let mut order: Vec<Shared<Module>> = vec![];
        let mut stack = vec![self.main()];
        while let Some(module) = stack.pop() {
            if order.iter().any(|m| Arc::ptr_eq(m, &module)) {
                continue;
            }
            order.push(module.clone());
            let children = module.rd().referenced_modules();
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }
        for module in &self.modules {
            if !order.iter().any(|m| Arc::ptr_eq(m, module)) {
                order.push(module.clone());
            }
        }
        order
    }

    /// Build the parent relation over all modules, rejecting cycles.
    pub fn get_module_tree(&self) -> Result<ModuleTree> {
        let mut parents: HashMap<String, Vec<Shared<Module>>> = HashMap::new();
        for module in &self.modules {
            for child in module.rd().referenced_modules() {
                parents
                    .entry(child.rd().name())
                    .or_default()
                    .push(module.clone());
            }
        }
        for module in &self.modules {
            self.check_cycle(module, &mut vec![])?;
        }
        Ok(ModuleTree { parents })
    }

    fn check_cycle(&self, module: &Shared<Module>, stack: &mut Vec<String>) -> Result<()> {
        let name = module.rd().name();
        if stack.contains(&name) {
            anyhow::bail!(
                "module tree contains a cycle through {name} (path: {})",
                stack.join(" -> ")
            );
        }
        stack.push(name);
        let children = module.rd().referenced_modules();
        for child in &children {
            self.check_cycle(child, stack)?;
        }
        stack.pop();
        Ok(())
    }
}

impl Default for Program {
    fn default() -> Program {
        Program::new()
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for module in self.get_modules() {
            module.rd().display(f, 0)?;
        }
        Ok(())
    }
}
