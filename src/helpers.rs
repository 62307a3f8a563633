use chrono::{DateTime, Utc};
use colored::Colorize;
use core::fmt;
use once_cell::sync::Lazy;

pub static SUCCESS: Lazy<colored::ColoredString> = Lazy::new(|| "[GOPM2]".green());
pub static FAIL: Lazy<colored::ColoredString> = Lazy::new(|| "[GOPM2]".red());
pub static WARN: Lazy<colored::ColoredString> = Lazy::new(|| "[GOPM2]".yellow());
pub static INFO: Lazy<colored::ColoredString> = Lazy::new(|| "[GOPM2]".cyan());

// Time constants for duration formatting
const SECONDS_IN_DAY: i64 = 24 * 60 * 60;
const SECONDS_IN_HOUR: i64 = 60 * 60;
const SECONDS_IN_MINUTE: i64 = 60;

#[derive(Clone, Debug)]
pub struct ColoredString(pub colored::ColoredString);

impl fmt::Display for ColoredString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compact uptime since `datetime`, largest unit only ("30s", "5m", "3h", "10d").
pub fn format_duration(datetime: DateTime<Utc>) -> String {
    let duration = Utc::now().signed_duration_since(datetime);
    format_uptime(duration.num_seconds().max(0) as u64)
}

pub fn format_uptime(secs: u64) -> String {
    match secs as i64 {
        s if s >= SECONDS_IN_DAY => format!("{}d", s / SECONDS_IN_DAY),
        s if s >= SECONDS_IN_HOUR => format!("{}h", s / SECONDS_IN_HOUR),
        s if s >= SECONDS_IN_MINUTE => format!("{}m", s / SECONDS_IN_MINUTE),
        s => format!("{}s", s),
    }
}

pub fn format_memory(bytes: u64) -> String {
    const UNIT: f64 = 1024.0;
    const SUFFIX: [&str; 4] = ["b", "kb", "mb", "gb"];

    let size = bytes as f64;
    if size <= 0.0 {
        return "0b".to_string();
    }

    let base = size.log10() / UNIT.log10();
    let exp = (base.floor() as usize).min(SUFFIX.len() - 1);

    let mut buffer = ryu::Buffer::new();
    let result = buffer
        .format((UNIT.powf(base - exp as f64) * 10.0).round() / 10.0)
        .trim_end_matches(".0");

    [result, SUFFIX[exp]].join("")
}

/// Duration strings as the snapshot and config files carry them
/// ("500ms", "1s", "1m30s", "2h"). Sub-second values render in
/// milliseconds, everything else as compact h/m/s.
pub mod duration {
    use once_cell::sync::Lazy;
    use regex::Regex;
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    static SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)(ms|s|m|h)").unwrap());

    pub fn parse(input: &str) -> Result<Duration, String> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err("empty duration".to_string());
        }

        let mut rest = trimmed;
        let mut total = Duration::ZERO;

        while !rest.is_empty() {
            let caps = SEGMENT
                .captures(rest)
                .ok_or_else(|| format!("invalid duration: {input}"))?;
            let value: f64 = caps[1]
                .parse()
                .map_err(|_| format!("invalid duration: {input}"))?;
            let millis = match &caps[2] {
                "ms" => value,
                "s" => value * 1000.0,
                "m" => value * 60.0 * 1000.0,
                "h" => value * 60.0 * 60.0 * 1000.0,
                _ => unreachable!(),
            };
            total += Duration::from_millis(millis.round() as u64);
            rest = &rest[caps[0].len()..];
        }

        Ok(total)
    }

    pub fn format(duration: Duration) -> String {
        let millis = duration.as_millis();
        if millis == 0 {
            return "0s".to_string();
        }
        if millis < 1000 {
            return format!("{millis}ms");
        }

        let mut secs = duration.as_secs();
        let mut out = String::new();
        if secs >= 3600 {
            out.push_str(&format!("{}h", secs / 3600));
            secs %= 3600;
        }
        if secs >= 60 {
            out.push_str(&format!("{}m", secs / 60));
            secs %= 60;
        }
        if secs > 0 || out.is_empty() {
            out.push_str(&format!("{}s", secs));
        }
        out
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    #[test]
    fn test_format_duration_seconds() {
        let datetime = Utc::now() - ChronoDuration::seconds(30);
        assert_eq!(format_duration(datetime), "30s");
    }

    #[test]
    fn test_format_duration_minutes() {
        let datetime = Utc::now() - ChronoDuration::minutes(5);
        assert_eq!(format_duration(datetime), "5m");
    }

    #[test]
    fn test_format_duration_hours() {
        let datetime = Utc::now() - ChronoDuration::hours(3);
        assert_eq!(format_duration(datetime), "3h");
    }

    #[test]
    fn test_format_duration_days() {
        let datetime = Utc::now() - ChronoDuration::days(10);
        assert_eq!(format_duration(datetime), "10d");
    }

    #[test]
    fn test_format_memory() {
        assert_eq!(format_memory(0), "0b");
        assert_eq!(format_memory(500), "500b");
        assert_eq!(format_memory(1024), "1kb");
        assert_eq!(format_memory(1024 * 1024), "1mb");
        assert_eq!(format_memory(1024 * 1024 * 1024 * 2), "2gb");
    }

    #[test]
    fn test_parse_duration_simple() {
        assert_eq!(duration::parse("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(duration::parse("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(duration::parse("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(duration::parse("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(duration::parse("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_duration_compound() {
        assert_eq!(duration::parse("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(duration::parse("1h2m3s").unwrap(), Duration::from_secs(3723));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(duration::parse("").is_err());
        assert!(duration::parse("abc").is_err());
        assert!(duration::parse("10x").is_err());
        assert!(duration::parse("-1s").is_err());
    }

    #[test]
    fn test_format_duration_string() {
        assert_eq!(duration::format(Duration::from_millis(500)), "500ms");
        assert_eq!(duration::format(Duration::from_secs(1)), "1s");
        assert_eq!(duration::format(Duration::from_secs(90)), "1m30s");
        assert_eq!(duration::format(Duration::from_secs(3600)), "1h");
        assert_eq!(duration::format(Duration::ZERO), "0s");
    }

    #[test]
    fn test_duration_round_trip() {
        for input in ["1s", "500ms", "1m30s", "2h", "10s"] {
            let parsed = duration::parse(input).unwrap();
            assert_eq!(duration::format(parsed), input);
        }
    }
}
