use std::sync::{Arc, Mutex};

use crate::dsp::chain::ProcessingChain;
use crate::dsp::StreamFormat;

/// The audio-side half of a virtual bus: the processing chain, the bus's
/// owned block buffer, and nothing else.
///
/// Shared between the control thread and the stream callback through a
/// [`ProcessorSlot`]. The callback takes the slot with `try_lock` so it can
/// never wait on the control thread; the control thread only holds the lock
/// for the microseconds a chain mutation takes, and a contended tick
/// degrades to a clean input pass-through instead of a stall.
pub struct BusProcessor {
    bus_name: String,
    format: StreamFormat,
    buffer: Vec<f32>,
    chain: ProcessingChain,
}

pub type ProcessorSlot = Arc<Mutex<BusProcessor>>;

impl BusProcessor {
    pub fn new(bus_name: impl Into<String>, format: StreamFormat) -> Self {
        Self {
            bus_name: bus_name.into(),
            format,
            buffer: vec![0.0; format.block_size * format.channels],
            chain: ProcessingChain::new(),
        }
    }

    pub fn bus_name(&self) -> &str {
        &self.bus_name
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Re-size the owned buffer and push the format into every stage.
    /// Control-thread only; runs before the stream opens.
    pub fn set_format(&mut self, format: StreamFormat) {
        self.format = format;
        self.buffer.resize(format.block_size * format.channels, 0.0);
        self.chain.set_format(format);
    }

    pub fn chain(&self) -> &ProcessingChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut ProcessingChain {
        &mut self.chain
    }

    /// One callback tick: copy the input frames into the owned buffer, run
    /// the chain, write the result out. Frames beyond what the bus buffer
    /// holds render as silence rather than a reallocation.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let take = input.len().min(output.len()).min(self.buffer.len());

        self.buffer[..take].copy_from_slice(&input[..take]);
        self.chain
            .process_block(&mut self.buffer[..take], self.format.channels);
        output[..take].copy_from_slice(&self.buffer[..take]);
        output[take..].fill(0.0);
    }
}
