/// Conversion from the scope's integer codes to physical units, as reported
/// by the `wfmoutpre:*` queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaveformScaling {
    /// Seconds per sample (`xincr`)
    pub x_increment: f64,
    /// Time of the first sample (`xzero`)
    pub x_zero: f64,
    /// Volts per code (`ymult`)
    pub y_mult: f64,
    /// Volts added after scaling (`yzero`)
    pub y_zero: f64,
    /// Vertical position in codes (`yoff`)
    pub y_offset: f64,
}

impl WaveformScaling {
    pub fn to_volts(&self, raw: f64) -> f64 {
        (raw - self.y_offset) * self.y_mult + self.y_zero
    }

    pub fn scale(&self, raw: &[i8]) -> Vec<f64> {
        raw.iter().map(|&r| self.to_volts(r as f64)).collect()
    }

    /// Sample instants `x_zero + i * x_increment`, the stop time excluded.
    pub fn time_axis(&self, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| self.x_zero + i as f64 * self.x_increment)
            .collect()
    }
}

/// One channel of one acquisition.
#[derive(Clone, Debug)]
pub struct Waveform {
    pub channel: String,
    pub time_s: Vec<f64>,
    pub volts: Vec<f64>,
    pub scaling: WaveformScaling,
}

impl Waveform {
    pub fn from_raw(channel: &str, raw: &[i8], scaling: WaveformScaling) -> Self {
        Self {
            channel: channel.to_string(),
            time_s: scaling.time_axis(raw.len()),
            volts: scaling.scale(raw),
            scaling,
        }
    }

    pub fn len(&self) -> usize {
        self.volts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volts.is_empty()
    }

    pub fn sample_interval(&self) -> f64 {
        self.scaling.x_increment
    }

    /// Keep only the first `seconds` of the record.
    pub fn crop(&mut self, seconds: f64) {
        let keep = (seconds / self.scaling.x_increment).round() as usize;
        self.time_s.truncate(keep);
        self.volts.truncate(keep);
    }
}

/// Waveforms of one grid point, in acquisition order.
#[derive(Clone, Debug, Default)]
pub struct Capture {
    waveforms: Vec<Waveform>,
}

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, waveform: Waveform) {
        if let Some(slot) = self
            .waveforms
            .iter_mut()
            .find(|w| w.channel == waveform.channel)
        {
            *slot = waveform;
        } else {
            self.waveforms.push(waveform);
        }
    }

    pub fn channel(&self, name: &str) -> Option<&Waveform> {
        self.waveforms.iter().find(|w| w.channel == name)
    }

    pub fn has_all(&self, names: &[&str]) -> bool {
        names.iter().all(|n| self.channel(n).is_some())
    }

    /// Crop every channel to its first `seconds`.
    pub fn crop(&mut self, seconds: f64) {
        for w in &mut self.waveforms {
            w.crop(seconds);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Waveform> {
        self.waveforms.iter()
    }

    pub fn len(&self) -> usize {
        self.waveforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waveforms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaling() -> WaveformScaling {
        WaveformScaling {
            x_increment: 1e-5,
            x_zero: -0.5,
            y_mult: 0.004,
            y_zero: 0.25,
            y_offset: 12.0,
        }
    }

    #[test]
    fn vertical_position_maps_to_offset() {
        let s = scaling();
        assert!((s.to_volts(12.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn scaling_is_affine() {
        let s = scaling();
        let (a, b) = (-40.0, 90.0);
        let lhs = s.to_volts(0.3 * a + 0.7 * b);
        let rhs = 0.3 * s.to_volts(a) + 0.7 * s.to_volts(b);
        assert!((lhs - rhs).abs() < 1e-12);
        // slope is y_mult
        assert!((s.to_volts(a + 1.0) - s.to_volts(a) - 0.004).abs() < 1e-12);
    }

    #[test]
    fn time_axis_excludes_stop() {
        let t = scaling().time_axis(4);
        assert_eq!(t.len(), 4);
        assert!((t[0] + 0.5).abs() < 1e-12);
        assert!((t[3] - (-0.5 + 3e-5)).abs() < 1e-12);
    }

    #[test]
    fn from_raw_scales_every_sample() {
        let w = Waveform::from_raw("CH1", &[12, 13, 11], scaling());
        assert_eq!(w.len(), 3);
        assert!((w.volts[1] - 0.254).abs() < 1e-12);
        assert!((w.volts[2] - 0.246).abs() < 1e-12);
    }

    #[test]
    fn crop_keeps_leading_samples() {
        let mut w = Waveform::from_raw("CH1", &[0; 100], scaling());
        w.crop(5e-4);
        assert_eq!(w.len(), 50);
        assert_eq!(w.time_s.len(), 50);
    }

    #[test]
    fn capture_replaces_same_channel() {
        let mut c = Capture::new();
        c.insert(Waveform::from_raw("CH1", &[1], scaling()));
        c.insert(Waveform::from_raw("CH2", &[1], scaling()));
        c.insert(Waveform::from_raw("CH1", &[1, 2], scaling()));
        assert_eq!(c.len(), 2);
        assert_eq!(c.channel("CH1").map(|w| w.len()), Some(2));
        assert!(c.has_all(&["CH1", "CH2"]));
        assert!(!c.has_all(&["CH3"]));
    }
}
