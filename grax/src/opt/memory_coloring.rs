use crate::ir::ref_id;
use crate::ir::ElementType;
use crate::ir::InstructionRef;
use crate::ir::Shape;
use crate::ops::builtin::Allocate;
use crate::ops::builtin::Load;
use crate::pass::ModulePassManager;
use crate::pass::Pass;
use crate::shared::SharedExt;
use crate::transform::TransformOptions;
use anyhow::Result;
use std::collections::HashSet;
use tracing::debug;

/// One scratch allocation with its live-range interval and, after coloring,
/// its byte placement in the shared arena.
struct Allocation {
    ins: InstructionRef,
    shape: Shape,
    size: usize,
    /// Program-order position of the defining instruction.
    first: usize,
    /// Position of the last instruction reading the buffer, following
    /// aliasing views and covering the full span of child-module calls.
    last: usize,
    offset: usize,
}

impl Allocation {
    fn interferes(&self, other: &Allocation) -> bool {
        self.first <= other.last && other.first <= self.last
    }
    fn overlaps(&self, other: &Allocation) -> bool {
        self.offset < other.offset + other.size && other.offset < self.offset + self.size
    }
}

/// Packs every scratch buffer of a module into one shared arena.
///
/// Buffers whose live ranges do not overlap may occupy the same bytes. The
/// packing is a greedy interval coloring: allocations are placed in
/// decreasing size order (ties by ascending position, for determinism), each
/// at the lowest byte offset that avoids every already-placed allocation it
/// interferes with. Interval graphs make this fast and near-optimal; exact
/// coloring of arbitrary interference graphs would be NP-hard and buys
/// nothing here.
pub struct MemoryColoring {
    allocation_op: String,
    enabled: bool,
    verify: bool,
}

impl MemoryColoring {
    pub fn new() -> MemoryColoring {
        MemoryColoring {
            allocation_op: "allocate".to_string(),
            enabled: true,
            verify: cfg!(debug_assertions),
        }
    }
    /// Honor the disable toggle of a pipeline invocation.
    pub fn with_options(options: &TransformOptions) -> MemoryColoring {
        let mut pass = MemoryColoring::new();
        pass.enabled = !options.disable_memory_coloring;
        pass
    }
    pub fn disabled() -> MemoryColoring {
        let mut pass = MemoryColoring::new();
        pass.enabled = false;
        pass
    }
    /// Re-check the packing invariant after placement (on by default in
    /// debug builds).
    pub fn with_verify(mut self, verify: bool) -> MemoryColoring {
        self.verify = verify;
        self
    }
}

impl Default for MemoryColoring {
    fn default() -> MemoryColoring {
        MemoryColoring::new()
    }
}

/// Live ranges for every non-empty allocation in the module.
///
/// The range runs from the allocation's position to the position of its last
/// reader. Readers are found through the alias closure: an instruction whose
/// output aliases the buffer (a view, or an operator writing through a
/// caller-provided output) extends the buffer's life through its own
/// readers. A reader that invokes child modules keeps the buffer live across
/// the whole call, since the call's internal access order is not visible at
/// this level.
fn live_ranges(instructions: &[InstructionRef], allocation_op: &str) -> Vec<Allocation> {
    let mut allocations = vec![];
    for (first, ins) in instructions.iter().enumerate() {
        let (name, shape) = {
            let guard = ins.rd();
            (guard.name(), guard.shape().clone())
        };
        if name != allocation_op || shape.bytes() == 0 {
            continue;
        }
        let mut aliases: HashSet<usize> = HashSet::new();
        aliases.insert(ref_id(ins));
        let mut last = first;
        for (position, reader) in instructions.iter().enumerate().skip(first + 1) {
            let guard = reader.rd();
            let read = guard
                .inputs()
                .iter()
                .any(|input| aliases.contains(&ref_id(input)));
            if !read {
                continue;
            }
            last = position;
            let shapes: Vec<Shape> = guard.inputs().iter().map(|i| i.rd().shape().clone()).collect();
            if let Some(index) = guard.operator().output_alias(&shapes) {
                if let Some(aliased) = guard.inputs().get(index) {
                    if aliases.contains(&ref_id(aliased)) {
                        aliases.insert(ref_id(reader));
                    }
                }
            }
        }
        let size = shape.bytes();
        allocations.push(Allocation {
            ins: ins.clone(),
            shape,
            size,
            first,
            last,
            offset: 0,
        });
    }
    allocations
}

/// Greedy placement. Returns the arena size.
fn color(allocations: &mut [Allocation]) -> usize {
    allocations.sort_by(|a, b| b.size.cmp(&a.size).then(a.first.cmp(&b.first)));
    let mut arena = 0;
    for index in 0..allocations.len() {
        let mut committed: Vec<(usize, usize)> = allocations[..index]
            .iter()
            .filter(|placed| placed.interferes(&allocations[index]))
            .map(|placed| (placed.offset, placed.size))
            .collect();
        committed.sort_unstable();
        let size = allocations[index].size;
        let mut offset = 0;
        for (start, len) in committed {
            if offset + size <= start {
                break;
            }
            offset = offset.max(start + len);
        }
        allocations[index].offset = offset;
        arena = arena.max(offset + size);
    }
    arena
}

impl Pass for MemoryColoring {
    fn name(&self) -> &str {
        "memory_coloring"
    }
    fn apply(&self, mpm: &mut ModulePassManager) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let module = mpm.module();
        let instructions = module.rd().instructions().to_vec();
        let mut allocations = live_ranges(&instructions, &self.allocation_op);
        if allocations.is_empty() {
            return Ok(());
        }
        let arena = color(&mut allocations);
        if self.verify {
            for (i, a) in allocations.iter().enumerate() {
                for b in allocations.iter().skip(i + 1) {
                    if a.interferes(b) && a.overlaps(b) {
                        anyhow::bail!(
                            "memory_coloring: overlapping placement in module {} \
                             ([{}, {}) vs [{}, {}))",
                            module.rd().name(),
                            a.offset,
                            a.offset + a.size,
                            b.offset,
                            b.offset + b.size
                        );
                    }
                }
            }
        }
        debug!(
            "memory_coloring: {} allocations packed into {arena} bytes in module {}",
            allocations.len(),
            module.rd().name()
        );
        // The arena backs every colored buffer, so it goes in front of the
        // earliest one.
        let earliest = allocations
            .iter()
            .min_by_key(|a| a.first)
            .map(|a| a.ins.clone())
            .unwrap();
        let scratch = module.wr().insert_before(
            &earliest,
            Allocate {
                shape: Shape::new(ElementType::Int8, vec![arena]),
            },
            vec![],
        )?;
        for allocation in &allocations {
            module.wr().replace_instruction(
                &allocation.ins,
                Load {
                    offset: allocation.offset,
                    shape: allocation.shape.clone(),
                },
                vec![scratch.clone()],
            )?;
        }
        Ok(())
    }
}
