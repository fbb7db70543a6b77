use std::f32::consts::{PI, SQRT_2};

/// Role a designed section plays inside an equalizer bank.
///
/// The lowest band gets a low shelf, the highest a high shelf, every
/// interior band a peaking section with bandwidth = center / Q.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterRole {
    LowShelf,
    HighShelf,
    Peaking,
}

/// Fixed quality factor for peaking bands.
pub const EQ_Q: f32 = 1.0;

/// Normalized second-order section. `a0` is already divided out.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoeffs {
    /// Pass-through section.
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };
}

/// Design a biquad for `role` at `freq_hz` with `gain_db` of boost or cut.
///
/// The linear gain factor `A = 10^(dB/40)` lands in the numerator terms for
/// boosts and in the denominator terms for cuts. That asymmetry is the
/// contract of the original engine and is kept bit-for-bit; it is an
/// approximation, not an analog-prototype derivation.
///
/// Returns the identity section when the frequency is at or beyond Nyquist,
/// not positive, or any input is non-finite.
pub fn design(role: FilterRole, freq_hz: f32, gain_db: f32, sample_rate: f32) -> BiquadCoeffs {
    let nyquist = sample_rate * 0.5;
    if !freq_hz.is_finite() || !gain_db.is_finite() || freq_hz <= 0.0 || freq_hz >= nyquist {
        return BiquadCoeffs::IDENTITY;
    }

    let a = 10f32.powf(gain_db / 40.0);
    let omega = 2.0 * PI * freq_hz / sample_rate;
    let (sin_w, cos_w) = omega.sin_cos();

    match role {
        FilterRole::Peaking => {
            let alpha = sin_w / (2.0 * EQ_Q);
            let b0 = 1.0 + alpha * a;
            let b1 = -2.0 * cos_w;
            let b2 = 1.0 - alpha * a;
            let a0 = 1.0 + alpha / a;
            let a1 = -2.0 * cos_w;
            let a2 = 1.0 - alpha / a;
            normalize(b0, b1, b2, a0, a1, a2)
        }
        FilterRole::LowShelf => {
            // Shelf slope fixed at 1.
            let alpha = sin_w / 2.0 * SQRT_2;
            let two_root_a_alpha = 2.0 * a.sqrt() * alpha;
            let b0 = a * ((a + 1.0) - (a - 1.0) * cos_w + two_root_a_alpha);
            let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w);
            let b2 = a * ((a + 1.0) - (a - 1.0) * cos_w - two_root_a_alpha);
            let a0 = (a + 1.0) + (a - 1.0) * cos_w + two_root_a_alpha;
            let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_w);
            let a2 = (a + 1.0) + (a - 1.0) * cos_w - two_root_a_alpha;
            normalize(b0, b1, b2, a0, a1, a2)
        }
        FilterRole::HighShelf => {
            let alpha = sin_w / 2.0 * SQRT_2;
            let two_root_a_alpha = 2.0 * a.sqrt() * alpha;
            let b0 = a * ((a + 1.0) + (a - 1.0) * cos_w + two_root_a_alpha);
            let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w);
            let b2 = a * ((a + 1.0) + (a - 1.0) * cos_w - two_root_a_alpha);
            let a0 = (a + 1.0) - (a - 1.0) * cos_w + two_root_a_alpha;
            let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w);
            let a2 = (a + 1.0) - (a - 1.0) * cos_w - two_root_a_alpha;
            normalize(b0, b1, b2, a0, a1, a2)
        }
    }
}

/// Pick the role for band `index` of a `band_count`-band bank.
pub fn role_for_band(index: usize, band_count: usize) -> FilterRole {
    if index == 0 {
        FilterRole::LowShelf
    } else if index + 1 == band_count {
        FilterRole::HighShelf
    } else {
        FilterRole::Peaking
    }
}

fn normalize(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> BiquadCoeffs {
    BiquadCoeffs {
        b0: b0 / a0,
        b1: b1 / a0,
        b2: b2 / a0,
        a1: a1 / a0,
        a2: a2 / a0,
    }
}

/// Second-order IIR runner: coefficients plus two samples of input and
/// output history (direct form I).
#[derive(Clone, Debug)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    pub fn identity() -> Self {
        Self::new(BiquadCoeffs::IDENTITY)
    }

    /// Swap coefficients without clearing filter history, so a running
    /// stream does not click on every parameter change.
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let c = &self.coeffs;
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2
            - c.a1 * self.y1
            - c.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    /// Steady-state amplitude of a sine at `freq` through `coeffs`, measured
    /// over the second half of a one-second run.
    fn sine_response(coeffs: BiquadCoeffs, freq: f32) -> f32 {
        let mut filter = Biquad::new(coeffs);
        let n = SR as usize;
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for i in 0..n {
            let t = i as f32 / SR;
            let x = (2.0 * PI * freq * t).sin();
            let y = filter.process(x);
            if i >= n / 2 {
                sum += f64::from(y * y);
                count += 1;
            }
        }
        ((sum / count as f64).sqrt() * std::f64::consts::SQRT_2) as f32
    }

    #[test]
    fn zero_gain_is_identity() {
        for role in [FilterRole::LowShelf, FilterRole::HighShelf, FilterRole::Peaking] {
            let c = design(role, 1_000.0, 0.0, SR);
            assert!((c.b0 - 1.0).abs() < 1e-5, "{role:?}: b0={}", c.b0);
            assert!((c.b1 - c.a1).abs() < 1e-5);
            assert!((c.b2 - c.a2).abs() < 1e-5);
        }
    }

    #[test]
    fn out_of_range_frequency_designs_neutral() {
        assert_eq!(design(FilterRole::Peaking, 0.0, 6.0, SR), BiquadCoeffs::IDENTITY);
        assert_eq!(design(FilterRole::Peaking, -20.0, 6.0, SR), BiquadCoeffs::IDENTITY);
        assert_eq!(design(FilterRole::Peaking, 24_000.0, 6.0, SR), BiquadCoeffs::IDENTITY);
        assert_eq!(design(FilterRole::Peaking, 30_000.0, 6.0, SR), BiquadCoeffs::IDENTITY);
        assert_eq!(design(FilterRole::Peaking, f32::NAN, 6.0, SR), BiquadCoeffs::IDENTITY);
    }

    #[test]
    fn peaking_boosts_center_leaves_far_frequencies() {
        let c = design(FilterRole::Peaking, 1_000.0, 6.0, SR);
        let at_center = sine_response(c, 1_000.0);
        let far_below = sine_response(c, 40.0);
        let far_above = sine_response(c, 15_000.0);

        assert!(at_center > 1.5, "center not boosted: {at_center}");
        assert!((far_below - 1.0).abs() < 0.05, "low skirt moved: {far_below}");
        assert!((far_above - 1.0).abs() < 0.05, "high skirt moved: {far_above}");
    }

    #[test]
    fn peaking_cut_attenuates_center() {
        let c = design(FilterRole::Peaking, 1_000.0, -6.0, SR);
        let at_center = sine_response(c, 1_000.0);
        assert!(at_center < 0.6, "center not cut: {at_center}");
    }

    #[test]
    fn low_shelf_boosts_lows_only() {
        let c = design(FilterRole::LowShelf, 200.0, 6.0, SR);
        let low = sine_response(c, 50.0);
        let high = sine_response(c, 10_000.0);

        assert!(low > 1.8, "shelf region not boosted: {low}");
        assert!((high - 1.0).abs() < 0.05, "passband moved: {high}");
    }

    #[test]
    fn high_shelf_boosts_highs_only() {
        let c = design(FilterRole::HighShelf, 8_000.0, 6.0, SR);
        let low = sine_response(c, 100.0);
        let high = sine_response(c, 18_000.0);

        assert!((low - 1.0).abs() < 0.05, "passband moved: {low}");
        assert!(high > 1.8, "shelf region not boosted: {high}");
    }

    #[test]
    fn band_roles_follow_position() {
        assert_eq!(role_for_band(0, 10), FilterRole::LowShelf);
        assert_eq!(role_for_band(9, 10), FilterRole::HighShelf);
        assert_eq!(role_for_band(4, 10), FilterRole::Peaking);
        // A single-band bank is all low shelf.
        assert_eq!(role_for_band(0, 1), FilterRole::LowShelf);
    }
}
