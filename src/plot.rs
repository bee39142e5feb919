//! SVG charts of traces, spectra and sweep summaries.

use std::path::Path;

use plotters::prelude::*;

use crate::analysis::{PeakSummary, Spectrum};
use crate::error::LabError;
use crate::report::{HeatMap, RmsRow};

const SIZE: (u32, u32) = (1000, 600);

/// Matplotlib's viridis, sampled at eight stops.
const VIRIDIS: [(u8, u8, u8); 8] = [
    (68, 1, 84),
    (70, 50, 126),
    (54, 92, 141),
    (39, 127, 142),
    (31, 161, 135),
    (74, 193, 109),
    (160, 218, 57),
    (253, 231, 37),
];

fn bounds(values: &[f64]) -> (f64, f64) {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < f64::EPSILON {
        return (lo - 1.0, hi + 1.0);
    }
    (lo, hi)
}

fn ensure_data(what: &str, len: usize) -> Result<(), LabError> {
    if len == 0 {
        return Err(LabError::Plot(format!("{what} has no samples")));
    }
    Ok(())
}

/// Single line through `(xs[i], ys[i])`.
pub fn line_chart(
    path: &Path,
    title: &str,
    labels: (&str, &str),
    xs: &[f64],
    ys: &[f64],
) -> Result<(), LabError> {
    let n = xs.len().min(ys.len());
    ensure_data(title, n)?;
    let (x_lo, x_hi) = bounds(&xs[..n]);
    let (y_lo, y_hi) = bounds(&ys[..n]);

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(title, ("sans-serif", 22))
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;
    chart
        .configure_mesh()
        .x_desc(labels.0)
        .y_desc(labels.1)
        .draw()?;
    chart.draw_series(LineSeries::new(
        xs[..n].iter().copied().zip(ys[..n].iter().copied()),
        &BLUE,
    ))?;
    root.present()?;
    Ok(())
}

/// Magnitude spectrum with the picked peaks marked and labelled.
pub fn spectrum_chart(
    path: &Path,
    title: &str,
    spectrum: &Spectrum,
    peaks: &PeakSummary,
) -> Result<(), LabError> {
    ensure_data(title, spectrum.len())?;
    let x_hi = spectrum
        .frequencies_hz
        .last()
        .copied()
        .unwrap_or(1.0)
        .max(f64::EPSILON);
    let y_hi = spectrum.max_magnitude().max(1e-12) * 1.1;

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(title, ("sans-serif", 22))
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(0.0..x_hi, 0.0..y_hi)?;
    chart
        .configure_mesh()
        .x_desc("Frequency (Hz)")
        .y_desc("Magnitude")
        .draw()?;
    chart
        .draw_series(LineSeries::new(
            spectrum
                .frequencies_hz
                .iter()
                .copied()
                .zip(spectrum.magnitudes.iter().copied()),
            &BLUE,
        ))?
        .label("FFT magnitude")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));
    chart
        .draw_series(
            peaks
                .peaks
                .iter()
                .map(|p| Cross::new((p.frequency_hz, p.magnitude), 6, RED.stroke_width(2))),
        )?
        .label("Peaks")
        .legend(|(x, y)| Cross::new((x + 10, y), 5, RED));
    chart.draw_series(peaks.peaks.iter().map(|p| {
        Text::new(
            format!("{:.3}", p.magnitude),
            (p.frequency_hz, p.magnitude),
            ("sans-serif", 14).into_font(),
        )
    }))?;
    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()?;
    root.present()?;
    Ok(())
}

/// Viridis colour for `t` in `0..=1`.
pub fn viridis(t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0) * (VIRIDIS.len() - 1) as f64;
    let i = (t.floor() as usize).min(VIRIDIS.len() - 2);
    let frac = t - i as f64;
    let (a, b) = (VIRIDIS[i], VIRIDIS[i + 1]);
    let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * frac).round() as u8;
    RGBColor(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

/// Colour for one heatmap cell; values under `vmin` are white.
pub fn cell_color(value: f64, vmin: f64, vmax: f64) -> RGBColor {
    if value < vmin || !value.is_finite() {
        return WHITE;
    }
    if vmax <= vmin {
        return viridis(1.0);
    }
    viridis((value - vmin) / (vmax - vmin))
}

/// Amplitude × frequency colour map with a colour bar, black cell borders.
pub fn heatmap(path: &Path, title: &str, map: &HeatMap, vmin: f64) -> Result<(), LabError> {
    ensure_data(title, map.amplitudes.len() * map.frequencies.len())?;
    let x_edges = HeatMap::edges(&map.amplitudes);
    let y_edges = HeatMap::edges(&map.frequencies);
    let vmax = map.max_value();

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let (plot_area, bar_area) = root.split_horizontally(SIZE.0 - 130);

    let x_range = x_edges[0]..x_edges[x_edges.len() - 1];
    let y_range = y_edges[0]..y_edges[y_edges.len() - 1];
    let mut chart = ChartBuilder::on(&plot_area)
        .margin(10)
        .caption(title, ("sans-serif", 22))
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Amplitude (V)")
        .y_desc("Frequency (Hz)")
        .draw()?;

    for (row, freq_cells) in map.values.iter().enumerate() {
        for (col, &value) in freq_cells.iter().enumerate() {
            let corners = [
                (x_edges[col], y_edges[row]),
                (x_edges[col + 1], y_edges[row + 1]),
            ];
            chart.draw_series(std::iter::once(Rectangle::new(
                corners,
                cell_color(value, vmin, vmax).filled(),
            )))?;
            chart.draw_series(std::iter::once(Rectangle::new(corners, BLACK.stroke_width(1))))?;
        }
    }

    let bar_top = vmax.max(vmin + f64::EPSILON);
    let mut bar = ChartBuilder::on(&bar_area)
        .margin_top(50)
        .margin_bottom(50)
        .margin_right(10)
        .y_label_area_size(70)
        .build_cartesian_2d(0.0..1.0, vmin..bar_top)?;
    bar.configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .y_desc("First Peak Magnitude")
        .draw()?;
    let steps = 64;
    let span = bar_top - vmin;
    bar.draw_series((0..steps).map(|i| {
        let lo = vmin + span * i as f64 / steps as f64;
        let hi = vmin + span * (i + 1) as f64 / steps as f64;
        Rectangle::new([(0.0, lo), (1.0, hi)], viridis(i as f64 / (steps - 1) as f64).filled())
    }))?;

    root.present()?;
    Ok(())
}

/// Per-frequency mean with a ± std bar for one RMS column.
pub fn error_bar_chart(
    path: &Path,
    title: &str,
    rows: &[RmsRow],
    select: fn(&RmsRow) -> (f64, f64),
) -> Result<(), LabError> {
    ensure_data(title, rows.len())?;
    let xs: Vec<f64> = rows.iter().map(|r| r.frequency_hz).collect();
    let mut ys = Vec::with_capacity(rows.len() * 2);
    for r in rows {
        let (mean, std) = select(r);
        ys.push(mean - std);
        ys.push(mean + std);
    }
    let (x_lo, x_hi) = bounds(&xs);
    let pad = (x_hi - x_lo) * 0.05;
    let (y_lo, y_hi) = bounds(&ys);

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(title, ("sans-serif", 22))
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d((x_lo - pad)..(x_hi + pad), y_lo..y_hi)?;
    chart
        .configure_mesh()
        .x_desc("Frequency (Hz)")
        .y_desc("RMS acceleration (m/s²)")
        .draw()?;

    let cap = (x_hi - x_lo).max(1.0) * 0.01;
    for r in rows {
        let (mean, std) = select(r);
        let x = r.frequency_hz;
        chart.draw_series([
            PathElement::new(vec![(x, mean - std), (x, mean + std)], BLUE),
            PathElement::new(vec![(x - cap, mean - std), (x + cap, mean - std)], BLUE),
            PathElement::new(vec![(x - cap, mean + std), (x + cap, mean + std)], BLUE),
        ])?;
        chart.draw_series(std::iter::once(Circle::new((x, mean), 4, BLUE.filled())))?;
    }
    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SpectralPeak;

    #[test]
    fn viridis_endpoints() {
        assert_eq!(viridis(0.0), RGBColor(68, 1, 84));
        assert_eq!(viridis(1.0), RGBColor(253, 231, 37));
        assert_eq!(viridis(7.0), viridis(1.0));
    }

    #[test]
    fn cells_below_vmin_are_white() {
        assert_eq!(cell_color(0.0, 0.01, 5.0), WHITE);
        assert_eq!(cell_color(0.005, 0.01, 5.0), WHITE);
        assert_eq!(cell_color(5.0, 0.01, 5.0), viridis(1.0));
        assert_eq!(cell_color(3.0, 0.01, 0.01), viridis(1.0));
    }

    #[test]
    fn writes_svg_files() {
        let dir = tempfile::tempdir().unwrap();

        let trace = dir.path().join("trace.svg");
        line_chart(&trace, "trace", ("t", "v"), &[0.0, 1.0, 2.0], &[0.0, 1.0, 0.0]).unwrap();
        assert!(std::fs::read_to_string(&trace).unwrap().contains("<svg"));

        let spectrum = Spectrum {
            frequencies_hz: vec![0.0, 10.0, 20.0, 30.0],
            magnitudes: vec![0.0, 3.0, 1.0, 0.5],
            record_len: 8,
            two_sided_max: 3.0,
        };
        let peaks = PeakSummary {
            peaks: vec![SpectralPeak {
                bin: 1,
                frequency_hz: 10.0,
                magnitude: 3.0,
            }],
        };
        let fft = dir.path().join("fft.svg");
        spectrum_chart(&fft, "fft", &spectrum, &peaks).unwrap();
        assert!(fft.exists());

        let map = HeatMap {
            amplitudes: vec![0.5, 1.0],
            frequencies: vec![150.0, 200.0],
            values: vec![vec![1.0, 0.0], vec![2.0, 3.0]],
        };
        let heat = dir.path().join("heat.svg");
        heatmap(&heat, "map", &map, 0.01).unwrap();
        assert!(heat.exists());

        let rows = [
            RmsRow {
                frequency_hz: 20.0,
                ids_mean: 1.0,
                ids_std: 0.1,
                acc_mean: 1.2,
                acc_std: 0.2,
            },
            RmsRow {
                frequency_hz: 40.0,
                ids_mean: 2.0,
                ids_std: 0.3,
                acc_mean: 2.2,
                acc_std: 0.1,
            },
        ];
        let bars = dir.path().join("rms.svg");
        error_bar_chart(&bars, "rms", &rows, |r| (r.ids_mean, r.ids_std)).unwrap();
        assert!(bars.exists());
    }

    #[test]
    fn empty_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(line_chart(&dir.path().join("x.svg"), "empty", ("t", "v"), &[], &[]).is_err());
    }
}
