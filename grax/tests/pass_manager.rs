extern crate grax;

use anyhow::Result;
use grax::ir::ElementType;
use grax::ir::Module;
use grax::ir::Operator;
use grax::ir::Program;
use grax::ir::Shape;
use grax::ops::builtin::Add;
use grax::pass::ModulePassManager;
use grax::pass::Pass;
use grax::run_passes;
use grax::run_passes_on_module;
use grax::shared::Shared;
use grax::shared::SharedExt;
use grax::TransformOptions;
use std::any::Any;
use std::sync::Arc;
use std::sync::Mutex;

#[derive(Clone)]
struct Invoke;

impl Operator for Invoke {
    fn name(&self) -> String {
        "invoke".to_string()
    }
    fn compute_shape(&self, _inputs: Vec<Shape>, _mods: &[Shared<Module>]) -> Result<Shape> {
        Ok(Shape::none())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn clone_box(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }
}

/// Logs every visit so tests can assert the traversal order.
struct RecordingPass {
    log: Arc<Mutex<Vec<String>>>,
}

impl Pass for RecordingPass {
    fn name(&self) -> &str {
        "recording"
    }
    fn apply(&self, mpm: &mut ModulePassManager) -> Result<()> {
        let mut entry = mpm.module().rd().name();
        if let Some(parent) = mpm.common_parent() {
            entry = format!("{entry}<{}", parent.rd().name());
        }
        self.log.lock().unwrap().push(entry);
        Ok(())
    }
    fn apply_program(&self, _program: &Shared<Program>) -> Result<()> {
        self.log.lock().unwrap().push("program".to_string());
        Ok(())
    }
}

/// Introduces a forward reference, which validation must catch.
struct BadPass;

impl Pass for BadPass {
    fn name(&self) -> &str {
        "bad"
    }
    fn apply(&self, mpm: &mut ModulePassManager) -> Result<()> {
        let module = mpm.module();
        let snapshot = module.rd().instructions().to_vec();
        if snapshot.len() < 3 {
            return Ok(());
        }
        let first = snapshot[1].clone();
        let second = snapshot[2].clone();
        let x = snapshot[0].clone();
        module.wr().replace_instruction(&first, Add, vec![second, x])?;
        Ok(())
    }
}

fn options() -> TransformOptions {
    TransformOptions {
        validate: true,
        ..TransformOptions::default()
    }
}

/// A three-level tree: main invokes b, b invokes c.
fn chain_program() -> (Shared<Program>, Shared<Module>, Shared<Module>) {
    let program = Shared::new(Program::new().into());
    let b = program.wr().create_module("b").unwrap();
    let c = program.wr().create_module("c").unwrap();
    b.wr()
        .add_instruction_with_modules(Invoke, vec![], vec![c.clone()])
        .unwrap();
    let main = program.rd().main();
    main.wr()
        .add_instruction_with_modules(Invoke, vec![], vec![b.clone()])
        .unwrap();
    (program, b, c)
}

#[test]
fn visits_children_before_parents() {
    let (program, _b, _c) = chain_program();
    let log = Arc::new(Mutex::new(vec![]));
    let passes: Vec<Box<dyn Pass>> = vec![Box::new(RecordingPass { log: log.clone() })];
    run_passes(&program, &passes, &options()).unwrap();
    let log = log.lock().unwrap().clone();
    assert_eq!(log, vec!["c<b", "b<main", "main", "program"]);
}

#[test]
fn each_pass_runs_fully_before_the_next() {
    let (program, _b, _c) = chain_program();
    let log = Arc::new(Mutex::new(vec![]));
    let passes: Vec<Box<dyn Pass>> = vec![
        Box::new(RecordingPass { log: log.clone() }),
        Box::new(RecordingPass { log: log.clone() }),
    ];
    run_passes(&program, &passes, &options()).unwrap();
    let log = log.lock().unwrap().clone();
    assert_eq!(
        log,
        vec!["c<b", "b<main", "main", "program", "c<b", "b<main", "main", "program"]
    );
}

#[test]
fn bypass_modules_are_skipped() {
    let (program, b, _c) = chain_program();
    b.wr().set_bypass(true);
    let log = Arc::new(Mutex::new(vec![]));
    let passes: Vec<Box<dyn Pass>> = vec![Box::new(RecordingPass { log: log.clone() })];
    run_passes(&program, &passes, &options()).unwrap();
    let log = log.lock().unwrap().clone();
    assert_eq!(log, vec!["c<b", "main", "program"]);
}

#[test]
fn multiple_parents_rejected() {
    let program = Shared::new(Program::new().into());
    let b = program.wr().create_module("b").unwrap();
    let shared_child = program.wr().create_module("shared").unwrap();
    let main = program.rd().main();
    main.wr()
        .add_instruction_with_modules(Invoke, vec![], vec![b.clone(), shared_child.clone()])
        .unwrap();
    b.wr()
        .add_instruction_with_modules(Invoke, vec![], vec![shared_child])
        .unwrap();

    let log = Arc::new(Mutex::new(vec![]));
    let passes: Vec<Box<dyn Pass>> = vec![Box::new(RecordingPass { log })];
    let err = run_passes(&program, &passes, &options());
    assert!(err.is_err());
    assert!(format!("{}", err.unwrap_err()).contains("parents"));
}

#[test]
fn validation_names_the_offending_pass() {
    let program = Shared::new(Program::new().into());
    let main = program.rd().main();
    {
        let mut module = main.wr();
        let x = module.add_parameter("x", Shape::new(ElementType::Float32, vec![4]));
        let first = module.add_instruction(Add, vec![x.clone(), x.clone()]).unwrap();
        module.add_instruction(Add, vec![first, x]).unwrap();
    }
    let passes: Vec<Box<dyn Pass>> = vec![Box::new(BadPass)];
    let err = run_passes(&program, &passes, &options());
    assert!(err.is_err());
    let message = format!("{}", err.unwrap_err());
    assert!(message.contains("bad"), "unexpected message: {message}");
    assert!(message.contains("instruction 1"), "unexpected message: {message}");
}

#[test]
fn bare_module_run() {
    let module = Shared::new(Module::new("solo").into());
    let log = Arc::new(Mutex::new(vec![]));
    let passes: Vec<Box<dyn Pass>> = vec![Box::new(RecordingPass { log: log.clone() })];
    run_passes_on_module(&module, &passes, &options()).unwrap();
    assert_eq!(log.lock().unwrap().clone(), vec!["solo"]);
}

#[test]
fn bare_module_cannot_create_modules() {
    struct CreatingPass;
    impl Pass for CreatingPass {
        fn name(&self) -> &str {
            "creating"
        }
        fn apply(&self, mpm: &mut ModulePassManager) -> Result<()> {
            mpm.create_module("fresh")?;
            Ok(())
        }
    }
    let module = Shared::new(Module::new("solo").into());
    let passes: Vec<Box<dyn Pass>> = vec![Box::new(CreatingPass)];
    assert!(run_passes_on_module(&module, &passes, &options()).is_err());

    // With a program behind the handle, creation succeeds.
    let program = Shared::new(Program::new().into());
    run_passes(&program, &passes, &options()).unwrap();
    assert!(program.rd().get_module("fresh").is_some());
}
