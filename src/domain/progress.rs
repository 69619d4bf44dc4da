//! Progress-to-target and win-rate arithmetic for enrollment display.
//!
//! Both figures are percentages in `[0, 100]`. Inputs that would divide by
//! zero or produce a non-finite value collapse to `0.0` so templates never
//! render `NaN` or `inf`.

/// Percentage of the phase target reached, clamped to `[0, 100]`.
///
/// A missing, zero, negative or non-finite target yields `0.0`.
pub fn progress_percent(profit: f64, target: Option<f64>) -> f64 {
    let target = match target {
        Some(t) if t.is_finite() && t > 0.0 => t,
        _ => return 0.0,
    };
    let pct = profit / target * 100.0;
    if pct.is_nan() {
        return 0.0;
    }
    pct.clamp(0.0, 100.0)
}

/// Winning trades as a percentage of all trades; `0.0` when no trades exist.
pub fn win_rate(winning_trades: u32, total_trades: u32) -> f64 {
    if total_trades == 0 {
        return 0.0;
    }
    let winning = winning_trades.min(total_trades);
    winning as f64 / total_trades as f64 * 100.0
}

/// One-decimal rendering used everywhere a percentage is shown.
pub fn format_percent(value: f64) -> String {
    format!("{:.1}", value)
}

/// Dollar amount with thousands separators. Whole amounts drop the cents.
pub fn format_money(value: f64) -> String {
    if !value.is_finite() {
        return "$0".to_string();
    }
    let sign = if value < 0.0 { "-" } else { "" };
    let cents = (value.abs() * 100.0).round() as u64;
    let (whole, frac) = (cents / 100, cents % 100);

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if frac == 0 {
        format!("{sign}${grouped}")
    } else {
        format!("{sign}${grouped}.{frac:02}")
    }
}
