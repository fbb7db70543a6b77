use log::warn;

use crate::dsp::{Processor, StreamFormat};

// ProcessingChain holds the ordered DSP stages of one virtual bus.
// Insertion order is execution order.
#[derive(Default)]
pub struct ProcessingChain {
    stages: Vec<Box<dyn Processor>>,
}

impl ProcessingChain {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn add_stage(&mut self, stage: Box<dyn Processor>) {
        self.stages.push(stage);
    }

    /// Remove the first stage with this label. Returns whether one existed.
    pub fn remove_stage(&mut self, label: &str) -> bool {
        if let Some(pos) = self.stages.iter().position(|s| s.label() == label) {
            self.stages.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.stages.clear();
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.label()).collect()
    }

    /// Push the bus format into every stage.
    pub fn set_format(&mut self, format: StreamFormat) {
        for stage in &mut self.stages {
            stage.set_format(format);
        }
    }

    // Run the block through every stage in order. A failing stage has
    // already restored the buffer (stage contract), so it is simply
    // bypassed for this tick; the error never crosses the callback
    // boundary.
    pub fn process_block(&mut self, buffer: &mut [f32], channels: usize) {
        for stage in &mut self.stages {
            if let Err(e) = stage.process_block(buffer, channels) {
                warn!("stage '{}' bypassed for this tick: {e}", stage.label());
            }
        }
    }
}
