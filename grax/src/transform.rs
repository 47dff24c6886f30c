use crate::ir::Module;
use crate::ir::Program;
use crate::pass::ModulePassManager;
use crate::pass::Pass;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use tracing::info;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;

/// Explicit configuration for one pipeline invocation.
///
/// Behavior is a pure function of these fields; there is no ambient
/// process-wide state. The fields map one-to-one onto [default_arguments].
#[derive(Clone, Debug)]
pub struct TransformOptions {
    /// Re-check module validity after every per-module pass application.
    /// Defaults on in debug builds only; the check is pure but not free.
    pub validate: bool,
    /// Report pass name, module name, and module contents before and after
    /// each application. A pure observer.
    pub trace_passes: bool,
    /// Disable the memory coloring pass entirely (debugging aid).
    pub disable_memory_coloring: bool,
    /// Divisor for worker-pool sizing during parallel compilation: a batch
    /// of `n` compile jobs runs on `n / divisor` workers (at least one).
    pub compile_parallelism: usize,
}

impl Default for TransformOptions {
    fn default() -> TransformOptions {
        TransformOptions {
            validate: cfg!(debug_assertions),
            trace_passes: false,
            disable_memory_coloring: false,
            compile_parallelism: 1,
        }
    }
}

impl TransformOptions {
    /// Build options from the args declared by [default_arguments].
    pub fn from_matches(matches: &ArgMatches) -> TransformOptions {
        let mut options = TransformOptions::default();
        if matches.get_flag("trace-passes") {
            options.trace_passes = true;
        }
        if matches.get_flag("validate-passes") {
            options.validate = true;
        }
        if matches.get_flag("disable-memory-coloring") {
            options.disable_memory_coloring = true;
        }
        if let Some(divisor) = matches.get_one::<usize>("compile-parallel") {
            options.compile_parallelism = (*divisor).max(1);
        }
        options
    }
}

/// Default arguments for drivers built on this crate.
///
/// `--debug`-style logging flags are not included so downstream projects can
/// handle logging differently.
pub fn default_arguments() -> Vec<Arg> {
    vec![
        Arg::new("trace-passes")
            .long("trace-passes")
            .help("Print each pass with the module before and after it")
            .action(ArgAction::SetTrue),
        Arg::new("validate-passes")
            .long("validate-passes")
            .help("Re-validate every module after every pass")
            .action(ArgAction::SetTrue),
        Arg::new("disable-memory-coloring")
            .long("disable-memory-coloring")
            .help("Skip scratch-memory packing (debugging aid)")
            .action(ArgAction::SetTrue),
        Arg::new("compile-parallel")
            .long("compile-parallel")
            .help("Worker-pool divisor for parallel kernel compilation")
            .value_parser(clap::value_parser!(usize)),
    ]
}

/// Initialize logging with the given level.
pub fn init_subscriber(level: Level) -> Result<(), SetGlobalDefaultError> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_test_writer()
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}

/// The pass tracing side channel. Reports through [tracing] when enabled and
/// never influences transformation outcomes.
pub struct Tracer {
    enabled: bool,
}

impl Tracer {
    pub fn new(enabled: bool) -> Tracer {
        Tracer { enabled }
    }
    pub fn trace(&self, message: impl FnOnce() -> String) {
        if self.enabled {
            info!("{}", message());
        }
    }
}

fn validate_pass(module: &Shared<Module>, pass: &dyn Pass, tracer: &Tracer) -> Result<()> {
    tracer.trace(|| "Validate ...".to_string());
    if let Some(index) = module.rd().validate() {
        let name = module.rd().instructions()[index].rd().name();
        anyhow::bail!(
            "{} pass produces invalid module {} at instruction {index}: {name}",
            pass.name(),
            module.rd().name()
        );
    }
    Ok(())
}

fn run_module_pass(
    mpm: &mut ModulePassManager,
    pass: &dyn Pass,
    tracer: &Tracer,
    validate: bool,
) -> Result<()> {
    let module = mpm.module();
    tracer.trace(|| {
        format!(
            "Module: {}, Pass: {}\n{}",
            module.rd().name(),
            pass.name(),
            module.rd()
        )
    });
    pass.apply(mpm)?;
    tracer.trace(|| format!("{}", module.rd()));
    if validate {
        validate_pass(&module, pass, tracer)?;
    }
    Ok(())
}

/// Apply each pass fully to a single module before moving to the next.
pub fn run_passes_on_module(
    module: &Shared<Module>,
    passes: &[Box<dyn Pass>],
    options: &TransformOptions,
) -> Result<()> {
    let tracer = Tracer::new(options.trace_passes);
    for pass in passes {
        let mut mpm = ModulePassManager::new(module.clone());
        run_module_pass(&mut mpm, pass.as_ref(), &tracer, options.validate)?;
    }
    Ok(())
}

/// Apply each pass over the whole program: bottom-up over the module tree
/// (children before their unique parent, bypass modules skipped), then once
/// to the program as a whole.
pub fn run_passes(
    program: &Shared<Program>,
    passes: &[Box<dyn Pass>],
    options: &TransformOptions,
) -> Result<()> {
    let tracer = Tracer::new(options.trace_passes);
    for pass in passes {
        let modules = program.rd().get_modules();
        let tree = program.rd().get_module_tree()?;
        for module in modules.iter().rev() {
            if module.rd().bypass() {
                continue;
            }
            let parents = tree.parents_of(module);
            if parents.len() > 1 {
                anyhow::bail!(
                    "module {} has {} parents; only one parent per module is supported",
                    module.rd().name(),
                    parents.len()
                );
            }
            let common_parent = parents.first().cloned();
            let mut mpm =
                ModulePassManager::with_program(module.clone(), program.clone(), common_parent);
            run_module_pass(&mut mpm, pass.as_ref(), &tracer, options.validate)?;
        }
        tracer.trace(|| format!("Pass: {}", pass.name()));
        pass.apply_program(program)?;
        tracer.trace(|| format!("{}", program.rd()));
    }
    Ok(())
}
