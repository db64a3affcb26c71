//! Delta-threshold event detection

/// What a single reading does to the baseline
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Detection {
    /// First reading; becomes the baseline without an event
    Establish,
    /// Within the threshold of the baseline
    Unchanged,
    /// Moved at least the threshold away; record `from -> to` and re-anchor at `to`
    Changed { from: f64, to: f64 },
}

/// Compare `value` against `baseline`.
///
/// There is no hysteresis: a reading exactly `threshold` away counts as a change,
/// and the baseline always jumps to the new value.
pub fn detect(baseline: Option<f64>, value: f64, threshold: f64) -> Detection {
    match baseline {
        None => Detection::Establish,
        Some(base) if (value - base).abs() >= threshold => Detection::Changed {
            from: base,
            to: value,
        },
        Some(_) => Detection::Unchanged,
    }
}
