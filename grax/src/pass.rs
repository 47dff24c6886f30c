use crate::ir::Module;
use crate::ir::Program;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;

/// A named, stateless transformation over a module or a whole program.
///
/// A pass carries only its own configuration; all state it needs about the
/// IR arrives through the [ModulePassManager] handle. `apply` runs once per
/// non-bypass module (children before their unique parent); `apply_program`
/// runs once afterwards for whole-graph cleanups and defaults to a no-op.
pub trait Pass: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, mpm: &mut ModulePassManager) -> Result<()>;
    fn apply_program(&self, _program: &Shared<Program>) -> Result<()> {
        Ok(())
    }
}

/// The handle a per-module pass transforms through.
///
/// Exposes the module under transformation, the capability to create new
/// modules (delegated to the owning program), and the module's unique
/// parent in the module tree.
pub struct ModulePassManager {
    module: Shared<Module>,
    program: Option<Shared<Program>>,
    common_parent: Option<Shared<Module>>,
}

impl ModulePassManager {
    /// A handle for a bare-module run; module creation is unavailable.
    pub fn new(module: Shared<Module>) -> ModulePassManager {
        ModulePassManager {
            module,
            program: None,
            common_parent: None,
        }
    }
    pub(crate) fn with_program(
        module: Shared<Module>,
        program: Shared<Program>,
        common_parent: Option<Shared<Module>>,
    ) -> ModulePassManager {
        ModulePassManager {
            module,
            program: Some(program),
            common_parent,
        }
    }
    /// The module being transformed.
    pub fn module(&self) -> Shared<Module> {
        self.module.clone()
    }
    /// Create a new module owned by the program, e.g. to split out a shared
    /// subgraph.
    pub fn create_module(&self, name: &str) -> Result<Shared<Module>> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("create_module: no program in a bare-module run"))?;
        program.wr().create_module(name)
    }
    /// The module's unique parent, or `None` for the top-level module.
    pub fn common_parent(&self) -> Option<Shared<Module>> {
        self.common_parent.clone()
    }
}
