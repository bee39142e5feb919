use log::debug;

/// Interferometer phase to displacement, picometres per degree.
pub const PM_PER_DEGREE: f64 = 100_000.0 / 90.0;

/// `plus - minus` sample by sample over the common prefix.
pub fn differential(plus: &[f64], minus: &[f64]) -> Vec<f64> {
    let n = common_len(plus.len(), minus.len());
    plus[..n]
        .iter()
        .zip(&minus[..n])
        .map(|(p, m)| p - m)
        .collect()
}

/// Quadrature demodulation: `atan2(sine, cosine)` in degrees times
/// `pm_per_degree`. The longer input is truncated to the shorter one.
pub fn arctan_displacement(sine: &[f64], cosine: &[f64], pm_per_degree: f64) -> Vec<f64> {
    let n = common_len(sine.len(), cosine.len());
    sine[..n]
        .iter()
        .zip(&cosine[..n])
        .map(|(s, c)| s.atan2(*c).to_degrees() * pm_per_degree)
        .collect()
}

fn common_len(a: usize, b: usize) -> usize {
    let n = a.min(b);
    if a != b {
        debug!("channel lengths differ ({a} vs {b}), truncating to {n}");
    }
    n
}
