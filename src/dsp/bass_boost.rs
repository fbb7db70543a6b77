use crossbeam::atomic::AtomicCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::dsp::design::{Biquad, FilterRole};
use crate::dsp::{Processor, StreamFormat, design};
use crate::error::EngineError;

const DEFAULT_CUTOFF_HZ: f32 = 200.0;
const DEFAULT_GAIN_DB: f32 = 6.0;

struct BassShared {
    enabled: AtomicBool,
    cutoff_hz: AtomicCell<f32>,
    gain_db: AtomicCell<f32>,
}

#[derive(Clone)]
pub struct BassBoostHandle {
    shared: Arc<BassShared>,
}

impl BassBoostHandle {
    pub fn set_cutoff(&self, cutoff_hz: f32) {
        self.shared.cutoff_hz.store(cutoff_hz.max(0.0));
    }

    pub fn cutoff(&self) -> f32 {
        self.shared.cutoff_hz.load()
    }

    pub fn set_gain(&self, gain_db: f32) {
        self.shared.gain_db.store(gain_db);
    }

    pub fn gain(&self) -> f32 {
        self.shared.gain_db.load()
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

/// Single low-shelf boost. Cheap enough that cutoff/gain changes rebuild
/// the section synchronously at the next tick, no smoothing needed.
pub struct BassBoost {
    shared: Arc<BassShared>,
    format: StreamFormat,
    built: (f32, f32, u32),
    filters: Vec<Biquad>,
}

impl BassBoost {
    pub fn new() -> (Self, BassBoostHandle) {
        Self::with_settings(DEFAULT_CUTOFF_HZ, DEFAULT_GAIN_DB)
    }

    pub fn with_settings(cutoff_hz: f32, gain_db: f32) -> (Self, BassBoostHandle) {
        let shared = Arc::new(BassShared {
            enabled: AtomicBool::new(true),
            cutoff_hz: AtomicCell::new(cutoff_hz),
            gain_db: AtomicCell::new(gain_db),
        });

        let mut boost = Self {
            shared: Arc::clone(&shared),
            format: StreamFormat::default(),
            built: (f32::NAN, f32::NAN, 0),
            filters: Vec::new(),
        };
        boost.rebuild(cutoff_hz, gain_db);

        (boost, BassBoostHandle { shared })
    }

    fn rebuild(&mut self, cutoff_hz: f32, gain_db: f32) {
        let coeffs = design::design(
            FilterRole::LowShelf,
            cutoff_hz,
            gain_db,
            self.format.sample_rate as f32,
        );
        self.filters
            .resize_with(self.format.channels.max(1), Biquad::identity);
        for filter in &mut self.filters {
            filter.set_coeffs(coeffs);
        }
        self.built = (cutoff_hz, gain_db, self.format.sample_rate);
    }
}

impl Processor for BassBoost {
    fn label(&self) -> &'static str {
        "bass_boost"
    }

    fn set_format(&mut self, format: StreamFormat) {
        if format.channels == 0 || format.sample_rate == 0 {
            return;
        }
        self.format = format;
        self.filters.clear();
        self.rebuild(self.shared.cutoff_hz.load(), self.shared.gain_db.load());
    }

    fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Relaxed)
    }

    fn process_block(&mut self, buffer: &mut [f32], channels: usize) -> Result<(), EngineError> {
        if !self.is_enabled() || buffer.is_empty() || channels == 0 {
            return Ok(());
        }

        let cutoff = self.shared.cutoff_hz.load();
        let gain = self.shared.gain_db.load();
        if (cutoff, gain, self.format.sample_rate) != self.built {
            self.rebuild(cutoff, gain);
        }

        for (ch, filter) in self.filters.iter_mut().take(channels).enumerate() {
            let mut idx = ch;
            while idx < buffer.len() {
                buffer[idx] = filter.process(buffer[idx]);
                idx += channels;
            }
        }

        Ok(())
    }
}
