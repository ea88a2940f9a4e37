//! `HH:MM:SS(.ff)` timestamp conversion.

/// Convert an `H:MM:SS` / `HH:MM:SS(.fraction)` timestamp into seconds.
///
/// Input that does not split into exactly three `:`-separated fields yields
/// `0.0`. Each field is parsed independently; a field that is not a number
/// contributes zero without discarding the others.
///
/// ```
/// assert_eq!(ffpilot_av::parse_duration("01:02:03"), 3723.0);
/// assert_eq!(ffpilot_av::parse_duration("garbage"), 0.0);
/// ```
pub fn parse_duration(s: &str) -> f64 {
    let fields: Vec<&str> = s.split(':').collect();
    let [h, m, sec] = fields.as_slice() else {
        return 0.0;
    };
    let field = |v: &str| v.parse::<f64>().unwrap_or(0.0);
    field(h) * 3600.0 + field(m) * 60.0 + field(sec)
}

/// Format seconds as `HH:MM:SS.ff`, the inverse of [`parse_duration`].
pub fn format_duration(seconds: f64) -> String {
    let seconds = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    };
    let centis = (seconds * 100.0).round() as u64;
    let (whole, frac) = (centis / 100, centis % 100);
    format!(
        "{:02}:{:02}:{:02}.{:02}",
        whole / 3600,
        (whole % 3600) / 60,
        whole % 60,
        frac
    )
}
