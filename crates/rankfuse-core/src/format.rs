//! Fixed-decimal number formatting shared by every writer in the pipeline.
//!
//! Rank files, graph files, and metrics files all carry scores formatted the
//! same way: dot decimal separator, no grouping, half-up rounding to a fixed
//! maximum number of fraction digits, trailing zeros (and a bare trailing
//! dot) trimmed. Keeping this in one place is what makes
//! `parse(serialize(x))` round-trip within the documented rounding.

/// Fraction digits used for rank scores and metric values.
pub const SCORE_DIGITS: u32 = 6;

/// Fraction digits used for graph vertex and edge weights, which accumulate
/// many small contributions and need the extra resolution.
pub const WEIGHT_DIGITS: u32 = 8;

/// Format `value` with at most `max_digits` fraction digits.
///
/// Rounding is half-up (ties away from zero). `1.0` renders as `"1"`,
/// `0.50` as `"0.5"`. Non-finite values render via their default `Display`
/// so that a NaN metric stays visibly NaN instead of masquerading as a
/// number.
#[must_use]
pub fn format_fixed(value: f64, max_digits: u32) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let scale = 10f64.powi(max_digits as i32);
    // f64::round is half-away-from-zero, i.e. half-up on magnitudes.
    let rounded = (value * scale).round() / scale;
    let mut text = format!("{rounded:.prec$}", prec = max_digits as usize);
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    if text == "-0" {
        "0".to_string()
    } else {
        text
    }
}

/// [`format_fixed`] at the standard score resolution.
#[must_use]
pub fn format_score(value: f64) -> String {
    format_fixed(value, SCORE_DIGITS)
}

/// [`format_fixed`] at the graph-weight resolution.
#[must_use]
pub fn format_weight(value: f64) -> String {
    format_fixed(value, WEIGHT_DIGITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_numbers_lose_the_dot() {
        assert_eq!(format_score(1.0), "1");
        assert_eq!(format_score(0.0), "0");
        assert_eq!(format_score(-3.0), "-3");
    }

    #[test]
    fn trailing_zeros_trimmed() {
        assert_eq!(format_score(0.5), "0.5");
        assert_eq!(format_score(0.250_000), "0.25");
    }

    #[test]
    fn rounds_half_up_at_max_digits() {
        assert_eq!(format_fixed(0.123_456_5, 6), "0.123457");
        assert_eq!(format_fixed(0.123_456_4, 6), "0.123456");
    }

    #[test]
    fn negative_zero_normalized() {
        assert_eq!(format_fixed(-0.000_000_01, 6), "0");
    }

    #[test]
    fn weight_resolution_is_wider() {
        assert_eq!(format_weight(0.000_000_12), "0.00000012");
        assert_eq!(format_score(0.000_000_12), "0");
    }

    #[test]
    fn nan_stays_visible() {
        assert_eq!(format_score(f64::NAN), "NaN");
    }
}
