//! Small UI helpers: durations, percentages, truncation.

use chrono::{DateTime, Utc};

pub fn fmt_pct(v: f64) -> String {
    format!("{:>5.1}%", v.clamp(0.0, 100.0))
}

/// Compact duration: `42s`, `5m 03s`, `7h 12m`, `3d 04h`.
pub fn fmt_duration(secs: u64) -> String {
    let (d, h, m, s) = (secs / 86_400, secs / 3600 % 24, secs / 60 % 60, secs % 60);
    if d > 0 {
        format!("{d}d {h:02}h")
    } else if h > 0 {
        format!("{h}h {m:02}m")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

pub fn fmt_clock(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&chrono::Local).format("%H:%M:%S").to_string()
}

pub fn truncate_middle(s: &str, max: usize) -> String {
    let n = s.chars().count();
    if n <= max {
        return s.to_string();
    }
    if max <= 3 {
        return "...".into();
    }
    let keep = max - 3;
    let left = keep / 2;
    let right = keep - left;
    let head: String = s.chars().take(left).collect();
    let tail: String = s.chars().skip(n - right).collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(fmt_duration(42), "42s");
        assert_eq!(fmt_duration(303), "5m 03s");
        assert_eq!(fmt_duration(7 * 3600 + 12 * 60), "7h 12m");
        assert_eq!(fmt_duration(3 * 86_400 + 4 * 3600 + 59), "3d 04h");
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate_middle("short", 10), "short");
        assert_eq!(truncate_middle("abcdefghij", 7), "ab...ij");
        assert_eq!(truncate_middle("ééééééééé", 5), "é...é");
    }
}
