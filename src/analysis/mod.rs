pub mod demod;
pub mod fft;
pub mod peaks;
pub mod stats;

pub use demod::{arctan_displacement, differential, PM_PER_DEGREE};
pub use fft::{magnitude_spectrum, Spectrum};
pub use peaks::{find_peaks, PeakCriteria, PeakSummary, SpectralPeak};
pub use stats::{mean, rms, std_dev};
