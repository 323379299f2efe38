// src/utils/time.rs

//! Timestamp helpers.
//!
//! Weibo search results carry relative Chinese timestamps ("5分钟前",
//! "昨天 12:30"). These are rewritten to absolute `YYYY-MM-DD HH:MM:SS`
//! against a caller-supplied reference clock so the CSV tables sort.

use chrono::{DateTime, Duration, Local};
use regex::Regex;

/// Local wall-clock timestamp in table format.
pub fn now_stamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Standardize a relative or partial Chinese timestamp.
///
/// Unrecognized input passes through trimmed but otherwise unchanged.
pub fn standardize(raw: &str, now: DateTime<Local>) -> String {
    let text = raw.trim();
    if text.is_empty() {
        return String::new();
    }

    if let Some(out) = minutes_ago(text, now) {
        return out;
    }
    if let Some(out) = hours_ago(text, now) {
        return out;
    }
    if let Some(out) = day_with_clock(text, now) {
        return out;
    }
    if let Some(out) = month_day(text, now) {
        return out;
    }

    text.to_string()
}

fn first_number(text: &str) -> Option<i64> {
    let re = Regex::new(r"(\d+)").ok()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn clock_part(text: &str) -> Option<String> {
    let re = Regex::new(r"(\d{1,2}:\d{2})").ok()?;
    Some(re.captures(text)?.get(1)?.as_str().to_string())
}

fn minutes_ago(text: &str, now: DateTime<Local>) -> Option<String> {
    if !text.contains("分钟前") {
        return None;
    }
    let m = first_number(text)?;
    Some((now - Duration::minutes(m)).format("%Y-%m-%d %H:%M:%S").to_string())
}

fn hours_ago(text: &str, now: DateTime<Local>) -> Option<String> {
    if !text.contains("小时前") {
        return None;
    }
    let h = first_number(text)?;
    Some((now - Duration::hours(h)).format("%Y-%m-%d %H:%M:%S").to_string())
}

/// "昨天 12:30" and "今天 09:05" forms.
fn day_with_clock(text: &str, now: DateTime<Local>) -> Option<String> {
    let date = if text.contains("昨天") {
        (now - Duration::days(1)).format("%Y-%m-%d").to_string()
    } else if text.contains("今天") {
        now.format("%Y-%m-%d").to_string()
    } else {
        return None;
    };
    let clock = clock_part(text)?;
    Some(format!("{date} {clock}:00"))
}

/// "3月5日" and "3月5日 14:20" forms; the year is assumed current.
fn month_day(text: &str, now: DateTime<Local>) -> Option<String> {
    if text.contains('年') {
        return None;
    }
    let re = Regex::new(r"(\d{1,2})月(\d{1,2})日").ok()?;
    let caps = re.captures(text)?;
    let month: u32 = caps.get(1)?.as_str().parse().ok()?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    let year = now.format("%Y").to_string();
    match clock_part(text) {
        Some(clock) => Some(format!("{year}-{month:02}-{day:02} {clock}:00")),
        None => Some(format!("{year}-{month:02}-{day:02} 00:00:00")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 10, 15, 30, 0).unwrap()
    }

    #[test]
    fn test_minutes_ago() {
        assert_eq!(standardize("5分钟前", fixed_now()), "2026-03-10 15:25:00");
    }

    #[test]
    fn test_hours_ago() {
        assert_eq!(standardize("2小时前", fixed_now()), "2026-03-10 13:30:00");
    }

    #[test]
    fn test_yesterday() {
        assert_eq!(standardize("昨天 12:30", fixed_now()), "2026-03-09 12:30:00");
    }

    #[test]
    fn test_today() {
        assert_eq!(standardize("今天 09:05", fixed_now()), "2026-03-10 09:05:00");
    }

    #[test]
    fn test_month_day() {
        assert_eq!(standardize("3月5日", fixed_now()), "2026-03-05 00:00:00");
        assert_eq!(standardize("3月5日 14:20", fixed_now()), "2026-03-05 14:20:00");
    }

    #[test]
    fn test_passthrough() {
        assert_eq!(
            standardize("2025-12-01 08:00:00", fixed_now()),
            "2025-12-01 08:00:00"
        );
        assert_eq!(standardize("2024年1月2日", fixed_now()), "2024年1月2日");
        assert_eq!(standardize("  ", fixed_now()), "");
    }
}
