use rust_decimal::Decimal;

/// Exponentially-weighted moving average update, the same smoothing shape
/// the teacher's `utils.rs` used for book-pressure signals. `alpha` is the
/// weight given to the new sample; `alpha = 1.0` discards history entirely.
pub fn ewma_update(previous: f64, sample: f64, alpha: f64) -> f64 {
    let alpha = alpha.clamp(0.0, 1.0);
    previous * (1.0 - alpha) + sample * alpha
}

/// Rounds a decimal to 2 fractional digits (cents), the size-precision
/// boundary spec.md §9 calls out alongside tick-rounded price.
pub fn round_to_cents(value: Decimal) -> Decimal {
    value.round_dp(2)
}

/// Formats a duration given in seconds as `HhMMmSSs`-ish compact text for
/// log lines, matching the teacher's preference for compact runtime logs
/// over verbose `Duration` debug output.
pub fn format_duration_secs(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as i64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{h}h{m:02}m{s:02}s")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{s}s")
    }
}
