extern crate grax;

use anyhow::Result;
use grax::ir::ref_id;
use grax::ir::ElementType;
use grax::ir::InstructionRef;
use grax::ir::Module;
use grax::ir::Operator;
use grax::ir::Program;
use grax::ir::Shape;
use grax::ops::builtin::Add;
use grax::ops::builtin::Mul;
use grax::ops::control_flow::If;
use grax::ops::sync::Record;
use grax::ops::sync::Wait;
use grax::opt::Schedule;
use grax::opt::SchedulingModel;
use grax::pass::Pass;
use grax::run_passes;
use grax::run_passes_on_module;
use grax::shared::Shared;
use grax::shared::SharedExt;
use grax::TransformOptions;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

/// A test device: `streams` in-order contexts, per-operator weights, and
/// synchronization through the shared marker instructions.
struct TestModel {
    streams: usize,
    weights: fn(&str) -> u64,
    assignments: Mutex<HashMap<usize, usize>>,
}

impl TestModel {
    fn new(streams: usize) -> TestModel {
        TestModel {
            streams,
            weights: |_| 1,
            assignments: Mutex::new(HashMap::new()),
        }
    }
    fn with_weights(streams: usize, weights: fn(&str) -> u64) -> TestModel {
        TestModel {
            streams,
            weights,
            assignments: Mutex::new(HashMap::new()),
        }
    }
    fn stream_of(&self, ins: &InstructionRef) -> Option<usize> {
        self.assignments.lock().unwrap().get(&ref_id(ins)).copied()
    }
}

impl SchedulingModel for TestModel {
    fn concurrency(&self) -> usize {
        self.streams
    }
    fn weight(&self, op: &dyn Operator) -> u64 {
        (self.weights)(&op.name())
    }
    fn sched(&self, _module: &Shared<Module>, ins: &InstructionRef, stream: usize) -> Result<()> {
        self.assignments.lock().unwrap().insert(ref_id(ins), stream);
        Ok(())
    }
    fn wait(&self, module: &Shared<Module>, ins: &InstructionRef, event: u64) -> Result<()> {
        module.wr().insert_before(ins, Wait { event }, vec![])?;
        Ok(())
    }
    fn record(&self, module: &Shared<Module>, ins: &InstructionRef, event: u64) -> Result<()> {
        module.wr().insert_after(ins, Record { event }, vec![])?;
        Ok(())
    }
}

fn vec_shape() -> Shape {
    Shape::new(ElementType::Float32, vec![4])
}

/// x, then a dependent chain of four additions, then a return.
fn chain_module() -> (Shared<Module>, Vec<InstructionRef>) {
    let module = Shared::new(Module::new("main").into());
    let mut chain = vec![];
    {
        let mut m = module.wr();
        let x = m.add_parameter("x", vec_shape());
        let mut last = m.add_instruction(Add, vec![x.clone(), x]).unwrap();
        chain.push(last.clone());
        for _ in 0..3 {
            last = m.add_instruction(Add, vec![last.clone(), last]).unwrap();
            chain.push(last.clone());
        }
        m.add_return(vec![last]).unwrap();
    }
    (module, chain)
}

fn options() -> TransformOptions {
    TransformOptions {
        validate: true,
        ..TransformOptions::default()
    }
}

fn sync_pairs(module: &Shared<Module>) -> (HashMap<u64, usize>, HashMap<u64, usize>) {
    let mut records = HashMap::new();
    let mut waits = HashMap::new();
    for (position, ins) in module.rd().instructions().iter().enumerate() {
        let guard = ins.rd();
        if let Some(record) = guard.downcast::<Record>() {
            records.insert(record.event, position);
        } else if let Some(wait) = guard.downcast::<Wait>() {
            waits.insert(wait.event, position);
        }
    }
    (records, waits)
}

#[test]
fn chain_alternates_streams_with_synchronization() {
    let (module, chain) = chain_module();
    let model = Arc::new(TestModel::new(2));
    let passes: Vec<Box<dyn Pass>> = vec![Box::new(Schedule::new(model.clone()))];
    run_passes_on_module(&module, &passes, &options()).unwrap();

    // Greedy lowest-weight assignment alternates a unit-weight chain.
    let streams: Vec<usize> = chain.iter().map(|ins| model.stream_of(ins).unwrap()).collect();
    assert_eq!(streams, vec![0, 1, 0, 1]);

    // Every edge crosses streams, so each gets exactly one record/wait pair.
    let (records, waits) = sync_pairs(&module);
    assert_eq!(records.len(), 3);
    assert_eq!(waits.len(), 3);
    for edge in 0..3 {
        let producer = module.rd().position_of(&chain[edge]).unwrap();
        let consumer = module.rd().position_of(&chain[edge + 1]).unwrap();
        let record = records[&(edge as u64)];
        let wait = waits[&(edge as u64)];
        assert!(producer < record, "record after its producer");
        assert!(record < wait, "record before the matching wait");
        assert!(wait < consumer, "wait before its consumer");
    }
    assert_eq!(module.rd().validate(), None);
}

#[test]
fn zero_concurrency_is_identity() {
    let (module, chain) = chain_module();
    let before = format!("{}", module.rd());
    let model = Arc::new(TestModel::new(0));
    let passes: Vec<Box<dyn Pass>> = vec![Box::new(Schedule::new(model.clone()))];
    run_passes_on_module(&module, &passes, &options()).unwrap();

    // Everything lands on the single implicit stream and nothing is inserted.
    for ins in &chain {
        assert_eq!(model.stream_of(ins), Some(0));
    }
    assert_eq!(format!("{}", module.rd()), before);
}

#[test]
fn redundant_same_stream_waits_are_elided() {
    // Two producers on one stream feed a consumer on another; waiting on the
    // later producer covers the earlier one because streams are in-order.
    let module = Shared::new(Module::new("main").into());
    let (i1, p1, p2, consumer) = {
        let mut m = module.wr();
        let x = m.add_parameter("x", vec_shape());
        let i1 = m.add_instruction(Mul, vec![x.clone(), x]).unwrap();
        let p1 = m.add_instruction(Add, vec![i1.clone(), i1.clone()]).unwrap();
        let p2 = m.add_instruction(Add, vec![p1.clone(), p1.clone()]).unwrap();
        let filler = m.add_instruction(Add, vec![p2.clone(), p2.clone()]).unwrap();
        let consumer = m.add_instruction(Mul, vec![p1.clone(), p2.clone()]).unwrap();
        m.add_return(vec![filler]).unwrap();
        (i1, p1, p2, consumer)
    };
    // mul weighs 3, add weighs 1: i1 pins stream 0, the adds pile onto
    // stream 1, and the final mul ties back to stream 0.
    let model = Arc::new(TestModel::with_weights(2, |name| match name {
        "mul" => 3,
        _ => 1,
    }));
    let passes: Vec<Box<dyn Pass>> = vec![Box::new(Schedule::new(model.clone()))];
    run_passes_on_module(&module, &passes, &options()).unwrap();

    assert_eq!(model.stream_of(&i1), Some(0));
    assert_eq!(model.stream_of(&p1), Some(1));
    assert_eq!(model.stream_of(&p2), Some(1));
    assert_eq!(model.stream_of(&consumer), Some(0));

    // Two cross-stream edges survive: i1 -> p1 and p2 -> consumer. The
    // consumer's second predecessor p1 shares p2's stream and is covered by
    // p2's wait.
    let (records, waits) = sync_pairs(&module);
    assert_eq!(records.len(), 2);
    assert_eq!(waits.len(), 2);
    let p2_position = module.rd().position_of(&p2).unwrap();
    let consumer_position = module.rd().position_of(&consumer).unwrap();
    assert!(records
        .values()
        .any(|position| *position > p2_position && *position < consumer_position));
    assert_eq!(module.rd().validate(), None);
}

#[test]
fn child_modules_are_opaque_by_default() {
    let program = Shared::new(Program::new().into());
    let then_branch = program.wr().create_module("then").unwrap();
    let else_branch = program.wr().create_module("else").unwrap();
    let mut branch_bodies = vec![];
    for branch in [&then_branch, &else_branch] {
        let mut m = branch.wr();
        let p = m.add_parameter("p", vec_shape());
        let body = m.add_instruction(Add, vec![p.clone(), p]).unwrap();
        m.add_return(vec![body.clone()]).unwrap();
        branch_bodies.push(body);
    }
    let main = program.rd().main();
    let selected = {
        let mut m = main.wr();
        let cond = m.add_parameter("c", Shape::scalar(ElementType::Bool));
        let selected = m
            .add_instruction_with_modules(If, vec![cond], vec![then_branch, else_branch])
            .unwrap();
        m.add_return(vec![selected.clone()]).unwrap();
        selected
    };

    let model = Arc::new(TestModel::new(2));
    let passes: Vec<Box<dyn Pass>> = vec![Box::new(Schedule::new(model.clone()))];
    run_passes(&program, &passes, &options()).unwrap();

    // The control-flow instruction itself is scheduled; the child modules
    // are opaque units the model did not ask to recurse into.
    assert!(model.stream_of(&selected).is_some());
    for body in &branch_bodies {
        assert_eq!(model.stream_of(body), None);
    }
}
