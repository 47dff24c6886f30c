extern crate grax;

use anyhow::Result;
use grax::ir::ElementType;
use grax::ir::Module;
use grax::ir::Operator;
use grax::ir::Shape;
use grax::ops::builtin::Allocate;
use grax::ops::builtin::Identity;
use grax::ops::builtin::Load;
use grax::opt::MemoryColoring;
use grax::pass::Pass;
use grax::run_passes_on_module;
use grax::shared::Shared;
use grax::shared::SharedExt;
use grax::TransformOptions;
use std::any::Any;

/// Reads its inputs and produces nothing; pins buffers live at a position.
#[derive(Clone)]
struct Sink;

impl Operator for Sink {
    fn name(&self) -> String {
        "sink".to_string()
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

fn f32_alloc(elements: usize) -> Allocate {
    Allocate {
        shape: Shape::new(ElementType::Float32, vec![elements]),
    }
}

/// Three allocations of sizes {8, 4, 4} bytes with live ranges
/// {[0, 5], [1, 2], [3, 5]} over six program positions.
fn interval_module() -> Shared<Module> {
    let module = Shared::new(Module::new("main").into());
    {
        let mut m = module.wr();
        let a = m.add_instruction(f32_alloc(2), vec![]).unwrap(); // position 0
        let b = m.add_instruction(f32_alloc(1), vec![]).unwrap(); // position 1
        m.add_instruction(Identity, vec![b]).unwrap(); // position 2, last use of b
        let c = m.add_instruction(f32_alloc(1), vec![]).unwrap(); // position 3
        m.add_instruction(Identity, vec![a.clone()]).unwrap(); // position 4
        m.add_instruction(Sink, vec![a, c]).unwrap(); // position 5, last use of a and c
    }
    module
}

fn coloring() -> Vec<Box<dyn Pass>> {
    vec![Box::new(MemoryColoring::new().with_verify(true))]
}

fn options() -> TransformOptions {
    TransformOptions {
        validate: true,
        ..TransformOptions::default()
    }
}

/// The byte offsets of every `load` rewritten from an allocation, keyed by
/// the view's byte size, plus the arena size.
fn placements(module: &Shared<Module>) -> (Vec<(usize, usize)>, usize) {
    let mut offsets = vec![];
    let mut arena = 0;
    for ins in module.rd().instructions() {
        let guard = ins.rd();
        if let Some(load) = guard.downcast::<Load>() {
            offsets.push((guard.shape().bytes(), load.offset));
        } else if guard.is::<Allocate>() {
            arena = guard.shape().bytes();
        }
    }
    (offsets, arena)
}

#[test]
fn packs_overlapping_buffers_disjointly() {
    let module = interval_module();
    run_passes_on_module(&module, &coloring(), &options()).unwrap();

    let (offsets, arena) = placements(&module);
    assert_eq!(arena, 12);
    // The 8-byte allocation takes the bottom of the arena; the two 4-byte
    // allocations have disjoint live ranges and share the bytes above it.
    assert_eq!(offsets, vec![(8, 0), (4, 8), (4, 8)]);
    assert_eq!(module.rd().validate(), None);
}

#[test]
fn coloring_is_deterministic() {
    let first = interval_module();
    let second = interval_module();
    run_passes_on_module(&first, &coloring(), &options()).unwrap();
    run_passes_on_module(&second, &coloring(), &options()).unwrap();
    assert_eq!(format!("{}", first.rd()), format!("{}", second.rd()));
}

#[test]
fn disabled_coloring_is_identity() {
    let module = interval_module();
    let before = format!("{}", module.rd());
    let passes: Vec<Box<dyn Pass>> = vec![Box::new(MemoryColoring::disabled())];
    run_passes_on_module(&module, &passes, &options()).unwrap();
    assert_eq!(format!("{}", module.rd()), before);
}

#[test]
fn disable_toggle_reaches_the_pass() {
    let module = interval_module();
    let before = format!("{}", module.rd());
    let toggled = TransformOptions {
        disable_memory_coloring: true,
        ..options()
    };
    let passes: Vec<Box<dyn Pass>> = vec![Box::new(MemoryColoring::with_options(&toggled))];
    run_passes_on_module(&module, &passes, &toggled).unwrap();
    assert_eq!(format!("{}", module.rd()), before);
}

#[test]
fn zero_sized_allocations_are_skipped() {
    let module = Shared::new(Module::new("main").into());
    {
        let mut m = module.wr();
        let empty = m.add_instruction(f32_alloc(0), vec![]).unwrap();
        let real = m.add_instruction(f32_alloc(4), vec![]).unwrap();
        m.add_instruction(Sink, vec![empty, real]).unwrap();
    }
    run_passes_on_module(&module, &coloring(), &options()).unwrap();

    let names: Vec<String> = module
        .rd()
        .instructions()
        .iter()
        .map(|ins| ins.rd().name())
        .collect();
    // The zero-sized allocation is left untouched; the real one became a
    // view of the arena.
    assert_eq!(names, vec!["allocate", "allocate", "load", "sink"]);
    let (offsets, arena) = placements(&module);
    assert_eq!(arena, 16);
    assert_eq!(offsets, vec![(16, 0)]);
}

#[test]
fn aliasing_views_extend_live_ranges() {
    // b's buffer is read through a view after a second allocation appears;
    // the two must not share bytes.
    let module = Shared::new(Module::new("main").into());
    {
        let mut m = module.wr();
        let b = m.add_instruction(f32_alloc(1), vec![]).unwrap(); // [0, ..]
        let view = m.add_instruction(Identity, vec![b]).unwrap(); // aliases b
        let c = m.add_instruction(f32_alloc(1), vec![]).unwrap();
        m.add_instruction(Sink, vec![view, c]).unwrap(); // reads b through the view
    }
    run_passes_on_module(&module, &coloring(), &options()).unwrap();
    let (offsets, _arena) = placements(&module);
    assert_eq!(offsets.len(), 2);
    assert_ne!(offsets[0].1, offsets[1].1);
}
