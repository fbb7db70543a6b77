/// Convert decibels to linear amplitude.
#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels, floored at -100 dB for silence.
#[inline]
pub fn lin_to_db(lin: f32) -> f32 {
    if lin > 1e-5 { 20.0 * lin.log10() } else { -100.0 }
}

/// One-pole smoothing step factor for a block of `block_dur_sec` against a
/// time constant `tau_sec`.
///
/// Returns `1 - exp(-block_dur / tau)`; a tau of zero jumps straight to the
/// target.
#[inline]
pub fn smoothing_alpha(block_dur_sec: f32, tau_sec: f32) -> f32 {
    if tau_sec <= 0.0 {
        1.0
    } else {
        1.0 - (-block_dur_sec / tau_sec).exp()
    }
}
