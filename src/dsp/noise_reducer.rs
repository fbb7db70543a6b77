use crossbeam::atomic::AtomicCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::dsp::{Processor, StreamFormat};
use crate::error::EngineError;

const DEFAULT_THRESHOLD: f32 = 0.1;

struct NoiseShared {
    enabled: AtomicBool,
    threshold: AtomicCell<f32>,
}

#[derive(Clone)]
pub struct NoiseReducerHandle {
    shared: Arc<NoiseShared>,
}

impl NoiseReducerHandle {
    pub fn set_threshold(&self, threshold: f32) {
        self.shared.threshold.store(threshold.clamp(0.0, 1.0));
    }

    pub fn threshold(&self) -> f32 {
        self.shared.threshold.load()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn toggle(&self) {
        self.shared.enabled.fetch_xor(true, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Relaxed)
    }
}

/// Per-sample soft gate. Samples below the threshold are attenuated by
/// `clamp((|x| - t) / t, 0, 1)`, everything from 2t upward passes whole.
/// A threshold of zero is the identity.
pub struct NoiseReducer {
    shared: Arc<NoiseShared>,
}

impl NoiseReducer {
    pub fn new() -> (Self, NoiseReducerHandle) {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(threshold: f32) -> (Self, NoiseReducerHandle) {
        let shared = Arc::new(NoiseShared {
            enabled: AtomicBool::new(true),
            threshold: AtomicCell::new(threshold.clamp(0.0, 1.0)),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            NoiseReducerHandle { shared },
        )
    }
}

impl Processor for NoiseReducer {
    fn label(&self) -> &'static str {
        "noise_reducer"
    }

    fn set_format(&mut self, _format: StreamFormat) {}

    fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Relaxed)
    }

    fn process_block(&mut self, buffer: &mut [f32], _channels: usize) -> Result<(), EngineError> {
        if !self.is_enabled() {
            return Ok(());
        }

        let threshold = self.shared.threshold.load();
        if threshold <= 0.0 {
            return Ok(());
        }

        for sample in buffer.iter_mut() {
            let mask = ((sample.abs() - threshold) / threshold).clamp(0.0, 1.0);
            *sample *= mask;
        }

        Ok(())
    }
}
