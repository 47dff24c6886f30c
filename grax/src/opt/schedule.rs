use crate::ir::ref_id;
use crate::ir::InstructionRef;
use crate::ir::Module;
use crate::ir::Operator;
use crate::ops::builtin::Param;
use crate::ops::builtin::Return;
use crate::ops::sync::Record;
use crate::ops::sync::Wait;
use crate::pass::ModulePassManager;
use crate::pass::Pass;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

/// The target-supplied policy the generic scheduler consumes.
///
/// A model decides how many concurrent execution contexts exist, what an
/// operator costs, and how assignments and synchronization materialize.
/// `sched` is an annotation (a model may or may not insert an IR node for
/// it); `wait` and `record` usually insert the shared
/// [sync](crate::ops::sync) markers immediately before the consumer and
/// after the producer.
pub trait SchedulingModel: Send + Sync {
    /// Number of concurrent execution contexts available.
    fn concurrency(&self) -> usize;
    /// Cost estimate used for balancing; non-negative.
    fn weight(&self, op: &dyn Operator) -> u64;
    /// Record that `ins` runs on `stream`.
    fn sched(&self, module: &Shared<Module>, ins: &InstructionRef, stream: usize) -> Result<()>;
    /// Block the owning stream before `ins` until `event` is signaled.
    fn wait(&self, module: &Shared<Module>, ins: &InstructionRef, event: u64) -> Result<()>;
    /// Signal `event` once `ins` completes.
    fn record(&self, module: &Shared<Module>, ins: &InstructionRef, event: u64) -> Result<()>;
    /// Whether the scheduler should also run on child modules of
    /// control-flow instructions. Those are opaque units by default.
    fn schedule_child_modules(&self) -> bool {
        false
    }
}

/// Partitions a module's instructions across concurrent streams and inserts
/// synchronization for every dependency edge that crosses streams.
///
/// Greedy list scheduling in program order, which is already consistent with
/// the dependency order by the forward-reference invariant: each instruction
/// goes to the stream with the lowest cumulative weight (ties to the lowest
/// stream index), keeping the result deterministic.
pub struct Schedule {
    pub model: Arc<dyn SchedulingModel>,
}

impl Schedule {
    pub fn new(model: Arc<dyn SchedulingModel>) -> Schedule {
        Schedule { model }
    }
}

fn schedulable(ins: &InstructionRef) -> bool {
    let guard = ins.rd();
    !guard.is::<Param>() && !guard.is::<Return>()
}

impl Pass for Schedule {
    fn name(&self) -> &str {
        "schedule"
    }
    fn apply(&self, mpm: &mut ModulePassManager) -> Result<()> {
        let module = mpm.module();
        if mpm.common_parent().is_some() && !self.model.schedule_child_modules() {
            return Ok(());
        }
        let snapshot = module.rd().instructions().to_vec();
        let concurrency = self.model.concurrency();
        if concurrency == 0 {
            // A single implicit stream: nothing can cross it, so no
            // synchronization is inserted.
            for ins in snapshot.iter().filter(|ins| schedulable(ins)) {
                self.model.sched(&module, ins, 0)?;
            }
            return Ok(());
        }

        let mut totals = vec![0u64; concurrency];
        let mut assignment: HashMap<usize, usize> = HashMap::new();
        for ins in snapshot.iter().filter(|ins| schedulable(ins)) {
            let stream = totals
                .iter()
                .enumerate()
                .min_by_key(|(index, weight)| (**weight, *index))
                .map(|(index, _)| index)
                .unwrap();
            self.model.sched(&module, ins, stream)?;
            totals[stream] += self.model.weight(ins.rd().operator());
            assignment.insert(ref_id(ins), stream);
        }

        let mut positions: HashMap<usize, usize> = HashMap::new();
        for (position, ins) in snapshot.iter().enumerate() {
            positions.insert(ref_id(ins), position);
        }
        let mut next_event = 0u64;
        for consumer in &snapshot {
            let consumer_stream = match assignment.get(&ref_id(consumer)) {
                Some(stream) => *stream,
                None => continue,
            };
            // Streams execute in order, so one wait on the latest producer
            // per stream provably covers that stream's earlier producers.
            // Keyed by stream index for a deterministic emission order.
            let mut latest: BTreeMap<usize, (usize, InstructionRef)> = BTreeMap::new();
            for input in consumer.rd().inputs() {
                let producer_stream = match assignment.get(&ref_id(input)) {
                    Some(stream) => *stream,
                    None => continue,
                };
                if producer_stream == consumer_stream {
                    continue;
                }
                let position = positions[&ref_id(input)];
                let replace = latest
                    .get(&producer_stream)
                    .map(|(existing, _)| position > *existing)
                    .unwrap_or(true);
                if replace {
                    latest.insert(producer_stream, (position, input.clone()));
                }
            }
            for (_, (_, producer)) in latest {
                let event = next_event;
                next_event += 1;
                self.model.record(&module, &producer, event)?;
                self.model.wait(&module, consumer, event)?;
            }
        }

        if cfg!(debug_assertions) {
            verify_synchronization(&module, &snapshot, &assignment)?;
        }
        Ok(())
    }
}

/// Debug re-check that no cross-stream dependency edge was left without a
/// record/wait pair between producer and consumer. A failure here is a
/// defect in the scheduling model, never a condition to route around.
///
/// Skipped for models that synchronize out-of-band (no sync markers in the
/// IR at all).
fn verify_synchronization(
    module: &Shared<Module>,
    scheduled: &[InstructionRef],
    assignment: &HashMap<usize, usize>,
) -> Result<()> {
    let instructions = module.rd().instructions().to_vec();
    let mut records: HashMap<u64, usize> = HashMap::new();
    let mut waits: HashMap<u64, usize> = HashMap::new();
    for (position, ins) in instructions.iter().enumerate() {
        let guard = ins.rd();
        if let Some(record) = guard.downcast::<Record>() {
            records.insert(record.event, position);
        } else if let Some(wait) = guard.downcast::<Wait>() {
            waits.insert(wait.event, position);
        }
    }
    if records.is_empty() {
        return Ok(());
    }
    let mut positions: HashMap<usize, usize> = HashMap::new();
    for (position, ins) in instructions.iter().enumerate() {
        positions.insert(ref_id(ins), position);
    }
    for consumer in scheduled {
        let consumer_stream = match assignment.get(&ref_id(consumer)) {
            Some(stream) => *stream,
            None => continue,
        };
        let consumer_position = positions[&ref_id(consumer)];
        for input in consumer.rd().inputs() {
            let producer_stream = match assignment.get(&ref_id(input)) {
                Some(stream) => *stream,
                None => continue,
            };
            if producer_stream == consumer_stream {
                continue;
            }
            let producer_position = positions[&ref_id(input)];
            let covered = records.iter().any(|(event, record_position)| {
                waits.get(event).map_or(false, |wait_position| {
                    *record_position > producer_position
                        && *record_position < *wait_position
                        && *wait_position < consumer_position
                })
            });
            if !covered {
                anyhow::bail!(
                    "schedule: dependency edge {} -> {} crosses streams {} -> {} \
                     without synchronization in module {}",
                    input.rd().name(),
                    consumer.rd().name(),
                    producer_stream,
                    consumer_stream,
                    module.rd().name()
                );
            }
        }
    }
    Ok(())
}
