//! Cadence-scaled arithmetic over index values.
//!
//! Gap, overlap, and bound decisions all compare index values against an
//! expected sample rate. Strict equality is wrong here: historical fixes
//! in this product line trace back to tolerance mistakes, so every
//! comparison goes through the helpers in this module.

/// Seconds (index units) per record at the given rate.
pub fn period(hz: f64) -> f64 {
    1.0 / hz
}

/// Slack applied when comparing an index value against a configured
/// bound. One part in 10^6 of the sample period: wide enough to absorb
/// float error on epoch-scale values, narrow enough that a genuinely
/// out-of-bounds record is never admitted.
pub fn bound_slack(hz: f64) -> f64 {
    1e-6 * period(hz)
}

/// The number of whole records strictly between index values `a` and `b`
/// at the given rate. Adjacent records (`b - a` of about one period)
/// have zero records between them.
pub fn records_between(a: f64, b: f64, hz: f64) -> usize {
    let n = ((b - a) * hz).round() as i64 - 1;
    n.max(0) as usize
}

/// Whether the step from `a` to `b` is a gap that needs filling. Steps
/// up to one and a half periods are treated as ordinary jitter.
pub fn is_gap(a: f64, b: f64, hz: f64) -> bool {
    b - a > 1.5 * period(hz)
}

/// Whether `b` duplicates `a`: two records closer together than half a
/// period cannot both be real samples.
pub fn is_duplicate(a: f64, b: f64, hz: f64) -> bool {
    b - a < 0.5 * period(hz)
}

/// Half-open bound check with cadence-scaled slack. `None` bounds are
/// unbounded on that side; with no cadence the comparison is exact.
pub fn in_bounds(v: f64, min: Option<f64>, max: Option<f64>, hz: Option<f64>) -> bool {
    let slack = hz.map(bound_slack).unwrap_or(0.0);
    if let Some(min) = min {
        if v - min < -slack {
            return false;
        }
    }
    if let Some(max) = max {
        if max - v <= slack {
            return false;
        }
    }
    true
}
