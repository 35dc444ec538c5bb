use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Symbolic lookback window for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    OneHour,
    #[default]
    #[serde(rename = "24h")]
    TwentyFourHours,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
    #[serde(rename = "90d")]
    NinetyDays,
}

impl TimeRange {
    pub const ALL: [TimeRange; 5] = [
        TimeRange::OneHour,
        TimeRange::TwentyFourHours,
        TimeRange::SevenDays,
        TimeRange::ThirtyDays,
        TimeRange::NinetyDays,
    ];

    /// Parse a range token. Unrecognized tokens map to the 24h default.
    pub fn parse(token: &str) -> Self {
        match token {
            "1h" => TimeRange::OneHour,
            "24h" => TimeRange::TwentyFourHours,
            "7d" => TimeRange::SevenDays,
            "30d" => TimeRange::ThirtyDays,
            "90d" => TimeRange::NinetyDays,
            other => {
                log::debug!("Unknown time range '{other}', using 24h");
                TimeRange::default()
            }
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            TimeRange::OneHour => "1h",
            TimeRange::TwentyFourHours => "24h",
            TimeRange::SevenDays => "7d",
            TimeRange::ThirtyDays => "30d",
            TimeRange::NinetyDays => "90d",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            TimeRange::OneHour => Duration::hours(1),
            TimeRange::TwentyFourHours => Duration::hours(24),
            TimeRange::SevenDays => Duration::days(7),
            TimeRange::ThirtyDays => Duration::days(30),
            TimeRange::NinetyDays => Duration::days(90),
        }
    }

    /// Earliest timestamp included in the window ending at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}
