use anyhow::Result;
use grax::ir::ref_id;
use grax::ir::InstructionRef;
use grax::ir::Module;
use grax::ir::Operator;
use grax::ops::sync::Record;
use grax::ops::sync::Wait;
use grax::opt::SchedulingModel;
use grax::shared::Shared;
use grax::shared::SharedExt;
use std::collections::HashMap;
use std::sync::Mutex;

/// The scheduling model of the reference target.
///
/// The reference device executes a fixed number of in-order streams. Stream
/// assignments are annotations kept on the model (the executor reads them
/// later); synchronization materializes as the shared `wait`/`record`
/// marker instructions.
pub struct RefModel {
    streams: usize,
    assignments: Mutex<HashMap<usize, usize>>,
}

impl RefModel {
    pub fn new(streams: usize) -> RefModel {
        RefModel {
            streams,
            assignments: Mutex::new(HashMap::new()),
        }
    }
    /// The stream assigned to an instruction, if it was scheduled.
    pub fn stream_of(&self, ins: &InstructionRef) -> Option<usize> {
        self.assignments.lock().unwrap().get(&ref_id(ins)).copied()
    }
    pub fn assignments(&self) -> HashMap<usize, usize> {
        self.assignments.lock().unwrap().clone()
    }
}

impl SchedulingModel for RefModel {
    fn concurrency(&self) -> usize {
        self.streams
    }
    fn weight(&self, op: &dyn Operator) -> u64 {
        // Views and constants cost nothing to issue; everything else is one
        // unit on this device.
        match op.name().as_str() {
            "literal" | "load" | "allocate" | "unsqueeze" | "contiguous" => 0,
            _ => 1,
        }
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
