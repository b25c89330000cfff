//! Display helpers for labour amounts. Formatting never feeds back into state.

use crate::constants::{BILLION, MILLION, THOUSAND, TRILLION};
use crate::numbers::floor_f64_to_u64;

/// Abbreviate with a K/M/B/T suffix and one decimal place. Halves round up.
///
/// ```
/// use labour_game::format::format_abbreviated;
/// assert_eq!(format_abbreviated(1234.0), "1.2K");
/// assert_eq!(format_abbreviated(1250.0), "1.3K");
/// assert_eq!(format_abbreviated(12.34), "12.3");
/// ```
#[must_use]
pub fn format_abbreviated(value: f64) -> String {
    if value < THOUSAND {
        one_decimal(value)
    } else if value < MILLION {
        format!("{}K", one_decimal(value / THOUSAND))
    } else if value < BILLION {
        format!("{}M", one_decimal(value / MILLION))
    } else if value < TRILLION {
        format!("{}B", one_decimal(value / BILLION))
    } else {
        format!("{}T", one_decimal(value / TRILLION))
    }
}

// `{:.1}` alone sends exact ties to even (1.25 -> "1.2").
fn one_decimal(value: f64) -> String {
    format!("{:.1}", (value * 10.0).round() / 10.0)
}

/// Integer part with thousands separators. Negative and NaN inputs render as `0`.
#[must_use]
pub fn format_with_commas(value: f64) -> String {
    let digits = floor_f64_to_u64(value).to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i).is_multiple_of(3) {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Multiplier as shown in stat panels, e.g. `1.25x`.
#[must_use]
pub fn format_multiplier(value: f64) -> String {
    format!("{value:.2}x")
}
