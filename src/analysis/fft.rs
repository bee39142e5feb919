use rustfft::{num_complex::Complex64, FftPlanner};

use crate::error::LabError;

/// One-sided magnitude spectrum, normalized by the record length.
#[derive(Clone, Debug)]
pub struct Spectrum {
    pub frequencies_hz: Vec<f64>,
    pub magnitudes: Vec<f64>,
    pub record_len: usize,
    /// Largest `|X_k| / N` over all N bins after low-bin zeroing, the
    /// negative-frequency mirrors of the cleared bins included
    pub two_sided_max: f64,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    pub fn max_magnitude(&self) -> f64 {
        self.magnitudes.iter().copied().fold(0.0, f64::max)
    }

    pub fn resolution_hz(&self) -> f64 {
        self.frequencies_hz.get(1).copied().unwrap_or(0.0)
    }
}

/// FFT of `signal` sampled every `dt` seconds.
///
/// Bin `k < N/2` has frequency `k / (N * dt)` and magnitude `|X_k| / N`.
/// The first `zero_low_bins` complex bins are cleared before taking
/// magnitudes. Their negative-frequency mirrors are left alone, so strong
/// drift still shows up in [`Spectrum::two_sided_max`].
pub fn magnitude_spectrum(
    signal: &[f64],
    dt: f64,
    zero_low_bins: usize,
) -> Result<Spectrum, LabError> {
    let n = signal.len();
    if n < 2 {
        return Err(LabError::EmptySignal(n));
    }

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buffer: Vec<Complex64> = signal.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    fft.process(&mut buffer);

    for bin in buffer.iter_mut().take(zero_low_bins) {
        *bin = Complex64::new(0.0, 0.0);
    }

    let two_sided_max = buffer
        .iter()
        .map(|c| c.norm() / n as f64)
        .fold(0.0, f64::max);

    let half = n / 2;
    let scale = 1.0 / (n as f64 * dt);
    let frequencies_hz = (0..half).map(|k| k as f64 * scale).collect();
    let magnitudes = buffer
        .iter()
        .take(half)
        .map(|c| c.norm() / n as f64)
        .collect();

    Ok(Spectrum {
        frequencies_hz,
        magnitudes,
        record_len: n,
        two_sided_max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn tone(freq: f64, amp: f64, rate: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| amp * (2.0 * PI * freq * i as f64 / rate).sin())
            .collect()
    }

    #[test]
    fn bin_centred_tone_has_half_amplitude() {
        let signal = tone(50.0, 2.0, 1000.0, 1000);
        let spectrum = magnitude_spectrum(&signal, 1e-3, 0).unwrap();
        assert_eq!(spectrum.len(), 500);
        assert!((spectrum.resolution_hz() - 1.0).abs() < 1e-12);
        assert!((spectrum.magnitudes[50] - 1.0).abs() < 1e-9);
        assert!(spectrum.magnitudes[49] < 1e-9);
        assert!((spectrum.max_magnitude() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn dc_is_normalized_mean() {
        let signal = vec![3.0; 64];
        let spectrum = magnitude_spectrum(&signal, 0.5, 0).unwrap();
        assert!((spectrum.magnitudes[0] - 3.0).abs() < 1e-12);
        assert!((spectrum.frequencies_hz[1] - 1.0 / 32.0).abs() < 1e-12);
    }

    #[test]
    fn low_bins_can_be_cleared() {
        let signal: Vec<f64> = tone(5.0, 1.0, 100.0, 200).iter().map(|v| v + 4.0).collect();
        let spectrum = magnitude_spectrum(&signal, 0.01, 3).unwrap();
        assert_eq!(spectrum.magnitudes[0], 0.0);
        assert_eq!(spectrum.magnitudes[2], 0.0);
        assert!(spectrum.magnitudes[10] > 0.4);
    }

    #[test]
    fn mirrored_drift_survives_in_two_sided_max() {
        // 2 Hz drift lands in bin 4 and its mirror at N - 4
        let signal: Vec<f64> = tone(2.0, 40.0, 100.0, 200)
            .iter()
            .zip(tone(30.0, 1.0, 100.0, 200))
            .map(|(d, s)| d + s)
            .collect();
        let spectrum = magnitude_spectrum(&signal, 0.01, 10).unwrap();
        assert!(spectrum.magnitudes[4] == 0.0);
        assert!((spectrum.max_magnitude() - 0.5).abs() < 1e-9);
        assert!((spectrum.two_sided_max - 20.0).abs() < 1e-9);
    }

    #[test]
    fn too_short_signal_is_an_error() {
        assert!(matches!(
            magnitude_spectrum(&[1.0], 1.0, 0),
            Err(LabError::EmptySignal(1))
        ));
    }
}
