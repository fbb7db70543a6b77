//! End-to-end spectral check: a routed bus with a boosted low band must
//! lift a low-frequency tone while leaving the top of the spectrum alone.

use std::f32::consts::PI;
use std::sync::Arc;

use claroute::bus::host::ManualHost;
use claroute::directory::DeviceDirectory;
use claroute::directory::mock::MockDirectory;
use claroute::dsp::StreamFormat;
use claroute::dsp::equalizer::Equalizer;
use claroute::router::{Category, Router};

const SAMPLE_RATE: u32 = 48_000;
const BLOCK_FRAMES: usize = 1024;
const CHANNELS: usize = 2;

fn directory() -> Arc<MockDirectory> {
    let directory = MockDirectory::new();
    directory.add_output(7, "Speakers");
    Arc::new(directory)
}

/// Interleaved stereo tone, one second long.
fn stereo_tone(freq: f32) -> Vec<f32> {
    (0..SAMPLE_RATE as usize)
        .flat_map(|i| {
            let s = 0.25 * (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin();
            [s, s]
        })
        .collect()
}

fn rms(samples: &[f32]) -> f32 {
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Push a tone through the routed bus block by block and return the RMS of
/// the second half of the output (past the filter transient).
fn processed_rms(host: &ManualHost, bus: &str, tone: &[f32]) -> f32 {
    let mut output = Vec::with_capacity(tone.len());
    let mut block_out = vec![0.0f32; BLOCK_FRAMES * CHANNELS];
    for block in tone.chunks(BLOCK_FRAMES * CHANNELS) {
        assert!(host.drive(bus, block, &mut block_out[..block.len()]));
        output.extend_from_slice(&block_out[..block.len()]);
    }
    rms(&output[output.len() / 2..])
}

#[test]
fn boosted_low_band_lifts_low_tone_only() {
    let directory = directory();
    let mut router = Router::new(
        Arc::clone(&directory) as Arc<dyn DeviceDirectory>,
        StreamFormat {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            block_size: BLOCK_FRAMES,
        },
    );
    let host = ManualHost::new();

    router.create_route(Category::Game, 7, "bus_game").unwrap();
    let (eq, handle) = Equalizer::new(10);
    router.apply_processing(Category::Game, Box::new(eq)).unwrap();
    router.start_routing(&host).unwrap();

    let low_freq = handle.frequencies()[0];
    let high_freq = handle.frequencies()[9].min(SAMPLE_RATE as f32 * 0.45);

    // Baseline with all gains flat: the chain is an identity.
    let low_tone = stereo_tone(low_freq);
    let high_tone = stereo_tone(high_freq);
    let low_baseline = processed_rms(&host, "bus_game", &low_tone);
    let high_baseline = processed_rms(&host, "bus_game", &high_tone);

    handle.set_gain(0, 6.0).unwrap();

    // Let the smoother converge (well past five time constants).
    let silence = vec![0.0f32; BLOCK_FRAMES * CHANNELS];
    let mut sink = vec![0.0f32; BLOCK_FRAMES * CHANNELS];
    for _ in 0..50 {
        assert!(host.drive("bus_game", &silence, &mut sink));
    }

    let low_boosted = processed_rms(&host, "bus_game", &low_tone);
    let high_boosted = processed_rms(&host, "bus_game", &high_tone);

    let low_gain_db = 20.0 * (low_boosted / low_baseline).log10();
    let high_gain_db = 20.0 * (high_boosted / high_baseline).log10();

    assert!(
        low_gain_db > 1.0,
        "low band shows no measurable boost: {low_gain_db:.2} dB"
    );
    assert!(
        high_gain_db.abs() <= 0.5,
        "high band deviated by {high_gain_db:.2} dB"
    );
}

#[test]
fn flat_equalizer_is_transparent_end_to_end() {
    let directory = directory();
    let mut router = Router::new(
        Arc::clone(&directory) as Arc<dyn DeviceDirectory>,
        StreamFormat {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            block_size: BLOCK_FRAMES,
        },
    );
    let host = ManualHost::new();

    router.create_route(Category::Game, 7, "bus_game").unwrap();
    let (eq, _handle) = Equalizer::new(10);
    router.apply_processing(Category::Game, Box::new(eq)).unwrap();
    router.start_routing(&host).unwrap();

    let tone = stereo_tone(440.0);
    let mut out = vec![0.0f32; BLOCK_FRAMES * CHANNELS];
    let block = &tone[..BLOCK_FRAMES * CHANNELS];
    assert!(host.drive("bus_game", block, &mut out));
    assert_eq!(block, &out[..], "flat bands must pass samples bit-exact");
}
