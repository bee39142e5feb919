/// Arithmetic mean, `None` for an empty slice.
pub fn mean(x: &[f64]) -> Option<f64> {
    if x.is_empty() {
        return None;
    }
    Some(x.iter().sum::<f64>() / x.len() as f64)
}

/// Root mean square, `None` for an empty slice.
pub fn rms(x: &[f64]) -> Option<f64> {
    if x.is_empty() {
        return None;
    }
    Some((x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt())
}

/// Population standard deviation.
pub fn std_dev(x: &[f64]) -> Option<f64> {
    let m = mean(x)?;
    Some((x.iter().map(|v| (v - m).powi(2)).sum::<f64>() / x.len() as f64).sqrt())
}
