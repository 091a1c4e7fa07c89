//! Affine score rescaling.
//!
//! Every stage that compares scores across descriptors first maps them onto a
//! common interval. The degenerate all-equal case maps every score to the
//! interval maximum, so a constant list still contributes full consensus
//! weight instead of vanishing.

/// Rescale `scores` into `[min_new, max_new]` with an affine map.
///
/// If all scores are equal, every score becomes `max_new`.
pub fn rescale(scores: &mut [f32], min_new: f32, max_new: f32) {
    let Some((min, max)) = min_max(scores.iter().copied()) else {
        return;
    };
    let range = max - min;
    if range == 0.0 {
        scores.fill(max_new);
        return;
    }
    let a = (max_new - min_new) / range;
    let b = max_new - a * max;
    for score in scores.iter_mut() {
        *score = a * *score + b;
    }
}

/// `f64` variant of [`rescale`], used for graph weights.
pub fn rescale_f64(values: &mut [f64], min_new: f64, max_new: f64) {
    let Some((min, max)) = min_max(values.iter().copied()) else {
        return;
    };
    let range = max - min;
    if range == 0.0 {
        values.fill(max_new);
        return;
    }
    let a = (max_new - min_new) / range;
    let b = max_new - a * max;
    for value in values.iter_mut() {
        *value = a * *value + b;
    }
}

fn min_max<T: PartialOrd + Copy>(values: impl Iterator<Item = T>) -> Option<(T, T)> {
    let mut out: Option<(T, T)> = None;
    for value in values {
        match &mut out {
            None => out = Some((value, value)),
            Some((min, max)) => {
                if value < *min {
                    *min = value;
                }
                if value > *max {
                    *max = value;
                }
            }
        }
    }
    out
}
