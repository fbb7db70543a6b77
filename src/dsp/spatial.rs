use crossbeam::atomic::AtomicCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::dsp::{Processor, StreamFormat};
use crate::error::EngineError;

const DEFAULT_WIDTH: f32 = 0.5;

struct SpatialShared {
    enabled: AtomicBool,
    width: AtomicCell<f32>,
}

#[derive(Clone)]
pub struct SpatialEnhancerHandle {
    shared: Arc<SpatialShared>,
}

impl SpatialEnhancerHandle {
    pub fn set_width(&self, width: f32) {
        self.shared.width.store(width.clamp(0.0, 1.0));
    }

    pub fn width(&self) -> f32 {
        self.shared.width.load()
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

/// Stereo widener: mid/side decomposition with the side signal scaled by
/// `1 + width`, then peak-normalized so the widened frame never clips.
/// Stateless; no-ops on anything that is not stereo.
pub struct SpatialEnhancer {
    shared: Arc<SpatialShared>,
}

impl SpatialEnhancer {
    pub fn new() -> (Self, SpatialEnhancerHandle) {
        Self::with_width(DEFAULT_WIDTH)
    }

    pub fn with_width(width: f32) -> (Self, SpatialEnhancerHandle) {
        let shared = Arc::new(SpatialShared {
            enabled: AtomicBool::new(true),
            width: AtomicCell::new(width.clamp(0.0, 1.0)),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            SpatialEnhancerHandle { shared },
        )
    }
}

impl Processor for SpatialEnhancer {
    fn label(&self) -> &'static str {
        "spatial"
    }

    fn set_format(&mut self, _format: StreamFormat) {}

    fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Relaxed)
    }

    fn process_block(&mut self, buffer: &mut [f32], channels: usize) -> Result<(), EngineError> {
        if !self.is_enabled() || channels != 2 || buffer.len() < 2 {
            return Ok(());
        }

        let width = self.shared.width.load();
        let side_scale = 1.0 + width;
        let mut peak = 0.0f32;

        for frame in buffer.chunks_exact_mut(2) {
            let mid = (frame[0] + frame[1]) * 0.5;
            let side = (frame[0] - frame[1]) * 0.5 * side_scale;
            frame[0] = mid + side;
            frame[1] = mid - side;
            peak = peak.max(frame[0].abs()).max(frame[1].abs());
        }

        if peak > 1.0 {
            let scale = 1.0 / peak;
            for sample in buffer.iter_mut() {
                *sample *= scale;
            }
        }

        Ok(())
    }
}
