//! Spectral peak picking with height, distance and prominence criteria.

use serde::{Deserialize, Serialize};

use crate::analysis::fft::Spectrum;

/// Selection rules applied to a magnitude spectrum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakCriteria {
    /// Minimum height as a fraction of the spectrum maximum
    #[serde(default = "PeakCriteria::default_height_fraction")]
    pub height_fraction: f64,
    /// Minimum spacing between kept peaks, in bins
    #[serde(default = "PeakCriteria::default_min_distance")]
    pub min_distance: usize,
    #[serde(default = "PeakCriteria::default_min_prominence")]
    pub min_prominence: f64,
    /// Leading FFT bins zeroed before picking
    #[serde(default)]
    pub zero_low_bins: usize,
}

impl PeakCriteria {
    fn default_height_fraction() -> f64 {
        0.01
    }
    fn default_min_distance() -> usize {
        100_000
    }
    fn default_min_prominence() -> f64 {
        1000.0
    }

    /// Settings used on CSV replays of the IDS stream.
    pub fn replay() -> Self {
        Self {
            height_fraction: 0.01,
            min_distance: 50,
            min_prominence: 10.0,
            zero_low_bins: 100,
        }
    }

    /// Peaks of the one-sided magnitudes. The height threshold is relative
    /// to [`Spectrum::two_sided_max`].
    pub fn pick(&self, spectrum: &Spectrum) -> PeakSummary {
        let height = self.height_fraction * spectrum.two_sided_max;
        let indices = find_peaks(
            &spectrum.magnitudes,
            Some(height),
            Some(self.min_distance),
            Some(self.min_prominence),
        );
        let peaks: Vec<SpectralPeak> = indices
            .into_iter()
            .map(|i| SpectralPeak {
                bin: i,
                frequency_hz: spectrum.frequencies_hz[i],
                magnitude: spectrum.magnitudes[i],
            })
            .collect();
        PeakSummary { peaks }
    }
}

impl Default for PeakCriteria {
    fn default() -> Self {
        Self {
            height_fraction: Self::default_height_fraction(),
            min_distance: Self::default_min_distance(),
            min_prominence: Self::default_min_prominence(),
            zero_low_bins: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpectralPeak {
    pub bin: usize,
    pub frequency_hz: f64,
    pub magnitude: f64,
}

/// Peaks in ascending frequency order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PeakSummary {
    pub peaks: Vec<SpectralPeak>,
}

impl PeakSummary {
    pub fn first(&self) -> Option<&SpectralPeak> {
        self.peaks.first()
    }

    pub fn second(&self) -> Option<&SpectralPeak> {
        self.peaks.get(1)
    }

    /// First peak magnitude over the second, `0.0` unless both exist.
    pub fn ratio(&self) -> f64 {
        match (self.first(), self.second()) {
            (Some(a), Some(b)) => a.magnitude / b.magnitude,
            _ => 0.0,
        }
    }
}

/// Indices of local maxima in `x` that satisfy every given criterion.
///
/// Flat tops report their middle sample. Filters run in the order height,
/// distance, prominence; the distance filter keeps the taller of two close
/// peaks.
pub fn find_peaks(
    x: &[f64],
    height: Option<f64>,
    distance: Option<usize>,
    prominence: Option<f64>,
) -> Vec<usize> {
    let mut peaks = local_maxima(x);

    if let Some(h) = height {
        peaks.retain(|&p| x[p] >= h);
    }
    if let Some(d) = distance {
        peaks = select_by_distance(x, &peaks, d.max(1));
    }
    if let Some(p_min) = prominence {
        peaks.retain(|&p| prominence_of(x, p) >= p_min);
    }
    peaks
}

fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let i_max = x.len() - 1;
    let mut i = 1;
    while i < i_max {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < i_max && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                let right = ahead - 1;
                peaks.push((i + right) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    peaks
}

fn select_by_distance(x: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    let n = peaks.len();
    let mut keep = vec![true; n];

    // Stable ascending sort by height, walked from the tallest down
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        x[peaks[a]]
            .partial_cmp(&x[peaks[b]])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < n && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, kept)| kept.then_some(p))
        .collect()
}

/// Height of `x[peak]` above the higher of the two bases, each base being
/// the minimum between the peak and the next higher sample on that side.
pub fn prominence_of(x: &[f64], peak: usize) -> f64 {
    let top = x[peak];

    let mut left_min = top;
    let mut i = peak;
    loop {
        if x[i] > top {
            break;
        }
        left_min = left_min.min(x[i]);
        if i == 0 {
            break;
        }
        i -= 1;
    }

    let mut right_min = top;
    for &v in &x[peak..] {
        if v > top {
            break;
        }
        right_min = right_min.min(v);
    }

    top - left_min.max(right_min)
}
