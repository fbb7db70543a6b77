use arc_swap::ArcSwap;
use crossbeam::atomic::AtomicCell;
use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::dsp::common::{db_to_lin, smoothing_alpha};
use crate::dsp::design::{Biquad, role_for_band};
use crate::dsp::{Processor, StreamFormat, design};
use crate::error::EngineError;

pub const MIN_FREQ_HZ: f32 = 20.0;
pub const MAX_FREQ_HZ: f32 = 20_000.0;

/// Per-band smoothed-gain movement that forces a coefficient rebuild.
const REBUILD_EPSILON_DB: f32 = 0.1;
/// Bands this close to flat are bypassed entirely.
const BYPASS_EPSILON_DB: f32 = 0.1;
/// Snap distance for the one-pole smoother.
const SNAP_EPSILON_DB: f32 = 1e-3;

const DEFAULT_SMOOTHING_TAU_SEC: f32 = 0.03;
const DEFAULT_BAND_COUNT: usize = 10;

/// Optional native acceleration backend for the equalizer hot path.
///
/// Same contract as the local cascade; the engine never depends on one
/// being present. A failing `process_block` is contained by the equalizer:
/// the tick passes through unmodified and the stream keeps running.
pub trait EqAccelerator: Send {
    fn set_format(&mut self, format: StreamFormat);
    fn set_band_gains(&mut self, gains_db: &[f32]);
    fn set_output_gain(&mut self, gain_db: f32);
    fn process_block(&mut self, buffer: &mut [f32], channels: usize) -> Result<(), EngineError>;
}

/// Band layout plus target gains, published as one immutable snapshot.
/// `generation` bumps only when the band count changes, so the audio side
/// knows when to re-size its filter state.
#[derive(Debug, Clone)]
struct BandTable {
    generation: u64,
    frequencies: Vec<f32>,
    target_gains_db: Vec<f32>,
}

impl BandTable {
    fn with_bands(generation: u64, bands: usize, old_gains: &[f32]) -> Self {
        let bands = bands.max(1);
        let mut target_gains_db = vec![0.0; bands];
        let keep = old_gains.len().min(bands);
        target_gains_db[..keep].copy_from_slice(&old_gains[..keep]);

        Self {
            generation,
            frequencies: log_spaced_frequencies(bands),
            target_gains_db,
        }
    }
}

/// Band center frequencies, log-spaced across 20 Hz - 20 kHz inclusive.
fn log_spaced_frequencies(bands: usize) -> Vec<f32> {
    if bands == 1 {
        return vec![MIN_FREQ_HZ];
    }
    let lo = MIN_FREQ_HZ.log10();
    let hi = MAX_FREQ_HZ.log10();
    let step = (hi - lo) / (bands - 1) as f32;
    (0..bands).map(|i| 10f32.powf(lo + step * i as f32)).collect()
}

struct EqShared {
    enabled: AtomicBool,
    table: ArcSwap<BandTable>,
    output_gain_db: AtomicCell<f32>,
    smoothing_tau_sec: AtomicCell<f32>,
}

/// Control-side handle. Every setter is lock-free and safe to call while
/// the audio thread is live; changes land on the next processing tick.
#[derive(Clone)]
pub struct EqualizerHandle {
    shared: Arc<EqShared>,
}

impl EqualizerHandle {
    pub fn band_count(&self) -> usize {
        self.shared.table.load().target_gains_db.len()
    }

    pub fn frequencies(&self) -> Vec<f32> {
        self.shared.table.load().frequencies.clone()
    }

    pub fn gains(&self) -> Vec<f32> {
        self.shared.table.load().target_gains_db.clone()
    }

    pub fn gain(&self, band: usize) -> Result<f32, EngineError> {
        let table = self.shared.table.load();
        table
            .target_gains_db
            .get(band)
            .copied()
            .ok_or(EngineError::BandOutOfRange {
                index: band,
                bands: table.target_gains_db.len(),
            })
    }

    /// Update the target gain for one band. The filter recompute is
    /// deferred to the next processing tick so a UI event handler never
    /// pays for filter design.
    pub fn set_gain(&self, band: usize, gain_db: f32) -> Result<(), EngineError> {
        let current = self.shared.table.load_full();
        if band >= current.target_gains_db.len() {
            return Err(EngineError::BandOutOfRange {
                index: band,
                bands: current.target_gains_db.len(),
            });
        }

        let mut next = (*current).clone();
        next.target_gains_db[band] = gain_db;
        self.shared.table.store(Arc::new(next));
        Ok(())
    }

    /// Bulk gain update, e.g. when applying a saved profile. Copies up to
    /// `min(bands, gains.len())` values.
    pub fn set_gains(&self, gains_db: &[f32]) {
        let current = self.shared.table.load_full();
        let mut next = (*current).clone();
        let keep = next.target_gains_db.len().min(gains_db.len());
        next.target_gains_db[..keep].copy_from_slice(&gains_db[..keep]);
        self.shared.table.store(Arc::new(next));
    }

    /// Change the number of bands. Rebuilds the log-spaced frequency table,
    /// preserves existing gains up to `min(old, new)` and zero-fills the
    /// rest; the audio side does a full filter rebuild on its next tick.
    pub fn set_band_count(&self, bands: usize) {
        let bands = bands.max(1);
        let current = self.shared.table.load_full();
        if bands == current.target_gains_db.len() {
            return;
        }
        let next = BandTable::with_bands(
            current.generation + 1,
            bands,
            &current.target_gains_db,
        );
        self.shared.table.store(Arc::new(next));
    }

    pub fn set_output_gain(&self, gain_db: f32) {
        self.shared.output_gain_db.store(gain_db);
    }

    pub fn output_gain(&self) -> f32 {
        self.shared.output_gain_db.load()
    }

    pub fn set_smoothing_time(&self, tau_sec: f32) {
        self.shared.smoothing_tau_sec.store(tau_sec.max(0.0));
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn enable(&self) {
        self.set_enabled(true);
    }

    pub fn disable(&self) {
        self.set_enabled(false);
    }

    pub fn toggle(&self) {
        self.shared.enabled.fetch_xor(true, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Relaxed)
    }
}

/// One band of the cascade: shared coefficients, one filter per channel.
struct BandFilter {
    active: bool,
    filters: Vec<Biquad>,
}

/// Multi-band equalizer stage.
///
/// Target gains live in a shared snapshot owned jointly with the
/// [`EqualizerHandle`]; the audio side smooths them toward their targets
/// each tick and rebuilds only the band coefficients that moved more than
/// 0.1 dB since the last build.
pub struct Equalizer {
    shared: Arc<EqShared>,
    format: StreamFormat,
    seen_generation: u64,
    smoothed_db: Vec<f32>,
    built_db: Vec<f32>,
    bands: Vec<BandFilter>,
    accel: Option<Box<dyn EqAccelerator>>,
    scratch: Vec<f32>,
}

impl Equalizer {
    pub fn new(bands: usize) -> (Self, EqualizerHandle) {
        let table = BandTable::with_bands(0, bands.max(1), &[]);
        let shared = Arc::new(EqShared {
            enabled: AtomicBool::new(true),
            table: ArcSwap::from_pointee(table),
            output_gain_db: AtomicCell::new(0.0),
            smoothing_tau_sec: AtomicCell::new(DEFAULT_SMOOTHING_TAU_SEC),
        });

        let mut eq = Self {
            shared: Arc::clone(&shared),
            format: StreamFormat::default(),
            seen_generation: 0,
            smoothed_db: Vec::new(),
            built_db: Vec::new(),
            bands: Vec::new(),
            accel: None,
            scratch: Vec::new(),
        };
        let table = eq.shared.table.load_full();
        eq.rebuild_state(&table);

        (eq, EqualizerHandle { shared })
    }

    pub fn with_default_bands() -> (Self, EqualizerHandle) {
        Self::new(DEFAULT_BAND_COUNT)
    }

    /// Attach a native acceleration backend. The local cascade stays fully
    /// functional and takes over whenever the backend fails at runtime.
    pub fn with_accelerator(mut self, accel: Box<dyn EqAccelerator>) -> Self {
        self.accel = Some(accel);
        if let Some(accel) = self.accel.as_mut() {
            accel.set_format(self.format);
        }
        self
    }

    /// Smoothed per-band gains as of the last processed tick, for metering.
    pub fn smoothed_gains_db(&self) -> &[f32] {
        &self.smoothed_db
    }

    /// Re-size all per-band state to the given table snapshot. Runs on
    /// construction, format pushes and band-count changes; this is the one
    /// place the audio side allocates, and topology changes are the
    /// pre-sizing events the steady-state no-allocation rule carves out.
    fn rebuild_state(&mut self, table: &BandTable) {
        let bands = table.target_gains_db.len();
        let channels = self.format.channels.max(1);

        self.seen_generation = table.generation;
        // Jump straight to the targets on a topology change; smoothing is
        // for gain moves, not for re-banding.
        self.smoothed_db = table.target_gains_db.clone();
        self.built_db = vec![f32::INFINITY; bands];
        self.bands = (0..bands)
            .map(|_| BandFilter {
                active: false,
                filters: vec![Biquad::identity(); channels],
            })
            .collect();
        self.scratch = vec![0.0; self.format.block_size * channels];
    }

    /// One smoothing step toward the published targets. Returns true when
    /// any band moved enough to need a coefficient rebuild.
    fn advance_smoothing(&mut self, targets: &[f32], block_dur_sec: f32) -> bool {
        let tau = self.shared.smoothing_tau_sec.load();
        let alpha = smoothing_alpha(block_dur_sec, tau);

        let mut needs_rebuild = false;
        for (i, smoothed) in self.smoothed_db.iter_mut().enumerate() {
            let target = targets[i];
            let delta = target - *smoothed;
            if delta.abs() <= SNAP_EPSILON_DB {
                *smoothed = target;
            } else {
                *smoothed += alpha * delta;
            }
            if (*smoothed - self.built_db[i]).abs() > REBUILD_EPSILON_DB {
                needs_rebuild = true;
            }
        }
        needs_rebuild
    }

    fn rebuild_moved_bands(&mut self, frequencies: &[f32]) {
        let band_count = self.bands.len();
        let sample_rate = self.format.sample_rate as f32;

        for (i, band) in self.bands.iter_mut().enumerate() {
            let gain = self.smoothed_db[i];
            if (gain - self.built_db[i]).abs() <= REBUILD_EPSILON_DB {
                continue;
            }
            self.built_db[i] = gain;

            band.active = gain.abs() >= BYPASS_EPSILON_DB;
            if band.active {
                let coeffs =
                    design::design(role_for_band(i, band_count), frequencies[i], gain, sample_rate);
                for filter in &mut band.filters {
                    filter.set_coeffs(coeffs);
                }
            } else {
                // Clear history so a later re-activation starts clean.
                for filter in &mut band.filters {
                    filter.reset();
                }
            }
        }
    }

    fn run_cascade(&mut self, buffer: &mut [f32], channels: usize) {
        for band in self.bands.iter_mut().filter(|b| b.active) {
            for (ch, filter) in band.filters.iter_mut().take(channels).enumerate() {
                let mut idx = ch;
                while idx < buffer.len() {
                    buffer[idx] = filter.process(buffer[idx]);
                    idx += channels;
                }
            }
        }
    }
}

impl Processor for Equalizer {
    fn label(&self) -> &'static str {
        "equalizer"
    }

    fn set_format(&mut self, format: StreamFormat) {
        if format.channels == 0 || format.sample_rate == 0 {
            warn!("equalizer ignoring degenerate format {format:?}");
            return;
        }
        self.format = format;
        let table = self.shared.table.load_full();
        self.rebuild_state(&table);
        if let Some(accel) = self.accel.as_mut() {
            accel.set_format(format);
        }
        debug!(
            "equalizer configured: {} bands at {} Hz, {} channels",
            self.bands.len(),
            format.sample_rate,
            format.channels
        );
    }

    fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Relaxed)
    }

    fn process_block(&mut self, buffer: &mut [f32], channels: usize) -> Result<(), EngineError> {
        if !self.is_enabled() || buffer.is_empty() || channels == 0 {
            return Ok(());
        }

        let table = self.shared.table.load_full();
        if table.generation != self.seen_generation {
            self.rebuild_state(&table);
        }

        let frames = buffer.len() / channels;
        let block_dur = frames as f32 / self.format.sample_rate as f32;
        let moved = self.advance_smoothing(&table.target_gains_db, block_dur);
        if moved {
            self.rebuild_moved_bands(&table.frequencies);
        }

        let output_gain_db = self.shared.output_gain_db.load();

        if let Some(accel) = self.accel.as_mut() {
            // Snapshot the input so a backend failure can pass the tick
            // through unmodified instead of leaking a half-written buffer.
            if self.scratch.len() < buffer.len() {
                self.scratch.resize(buffer.len(), 0.0);
            }
            self.scratch[..buffer.len()].copy_from_slice(buffer);

            if moved {
                accel.set_band_gains(&self.smoothed_db);
            }
            accel.set_output_gain(output_gain_db);
            match accel.process_block(buffer, channels) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("equalizer accelerator failed, passing tick through: {e}");
                    buffer.copy_from_slice(&self.scratch[..buffer.len()]);
                    return Ok(());
                }
            }
        }

        self.run_cascade(buffer, channels);

        if output_gain_db != 0.0 {
            let gain = db_to_lin(output_gain_db);
            for sample in buffer.iter_mut() {
                *sample *= gain;
            }
        }

        Ok(())
    }
}
