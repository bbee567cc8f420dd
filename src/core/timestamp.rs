use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unit of every timestamp and time anchor handled by a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    #[default]
    Millis,
    Seconds,
}

impl TimeUnit {
    pub fn now(self) -> i64 {
        self.from_millis(utc_ms_now())
    }

    /// Converts epoch milliseconds into this unit, truncating.
    pub fn from_millis(self, ms: i64) -> i64 {
        match self {
            TimeUnit::Millis => ms,
            TimeUnit::Seconds => ms / 1000,
        }
    }

    pub fn to_millis(self, value: i64) -> i64 {
        match self {
            TimeUnit::Millis => value,
            TimeUnit::Seconds => value.saturating_mul(1000),
        }
    }
}

pub fn utc_ms_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Human readable form of an absolute anchor, for log lines.
pub fn format_anchor(value: i64, unit: TimeUnit) -> String {
    match chrono::DateTime::from_timestamp_millis(unit.to_millis(value)) {
        Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_truncate() {
        assert_eq!(TimeUnit::Seconds.from_millis(5_999), 5);
        assert_eq!(TimeUnit::Millis.from_millis(5_999), 5_999);
        assert_eq!(TimeUnit::Seconds.to_millis(5), 5_000);
    }

    #[test]
    fn now_is_positive() {
        assert!(TimeUnit::Millis.now() > 1_600_000_000_000);
        assert!(TimeUnit::Seconds.now() > 1_600_000_000);
    }

    #[test]
    fn anchor_formatting() {
        assert_eq!(format_anchor(0, TimeUnit::Seconds), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_anchor(1_500, TimeUnit::Millis), "1970-01-01T00:00:01.500Z");
    }
}
