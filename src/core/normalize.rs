// White balance fine tune conversion.
//
// Cameras report the fine tune shift in raw units, twenty per step shown on
// the camera. The catalog stores the on-camera steps.

use regex::Regex;
use std::sync::LazyLock;

const RAW_UNITS_PER_STEP: i64 = 20;

static CHANNEL_SHIFT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(Red|Blue)\s*([+-]?\d+)").expect("valid channel shift pattern"));

/// Convert a raw `WhiteBalanceFineTune` value (e.g. `Red +60, Blue -100`) to
/// catalog units (`Red +3, Blue -5`).
///
/// Division floors toward negative infinity, so `-21` becomes `-2`. Input
/// without any channel/value pair, or with values that don't fit an `i64`,
/// is returned unchanged.
pub fn normalize_white_balance_fine_tune(raw: &str) -> String {
    let Some(shifts) = channel_shifts(raw) else {
        return raw.to_string();
    };
    if shifts.is_empty() {
        return raw.to_string();
    }

    shifts
        .into_iter()
        .map(|(channel, value)| {
            let steps = value.div_euclid(RAW_UNITS_PER_STEP);
            let sign = if steps >= 0 { "+" } else { "" };
            format!("{channel} {sign}{steps}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every channel/value pair, left to right. `None` when a number doesn't
/// parse.
fn channel_shifts(raw: &str) -> Option<Vec<(&str, i64)>> {
    CHANNEL_SHIFT_RE
        .captures_iter(raw)
        .map(|caps| {
            let channel = caps.get(1)?.as_str();
            let value = caps.get(2)?.as_str().parse::<i64>().ok()?;
            Some((channel, value))
        })
        .collect()
}
