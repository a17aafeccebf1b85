//! # Time Ranges
//!
//! The three ways a search can bound time: a relative window ending now, an
//! absolute interval, or a human keyword such as `last 15 minutes`.
//! Every range is validated when it is built, so a [`TimeRange`] held by a
//! query is always resolvable.

use crate::error::{PlanError, Result};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Default window for a query that declares no time range (five minutes).
pub const DEFAULT_RELATIVE_RANGE: u64 = 300;

/// Widest relative or keyword window accepted, in seconds (about 1000 years).
pub const MAX_WINDOW_SECONDS: i64 = 1000 * 366 * 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", try_from = "RawTimeRange")]
pub enum TimeRange {
    /// The last `range` seconds. Zero means "all time".
    Relative { range: u64 },
    Absolute {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    Keyword {
        keyword: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timezone: Option<String>,
    },
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::Relative {
            range: DEFAULT_RELATIVE_RANGE,
        }
    }
}

impl TimeRange {
    pub fn relative(range: i64) -> Result<Self> {
        if range < 0 {
            return Err(PlanError::InvalidTimeRange(format!(
                "relative range must not be negative, got {}",
                range
            )));
        }
        window(range)?;
        Ok(Self::Relative {
            range: range as u64,
        })
    }

    pub fn absolute(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if from > to {
            return Err(PlanError::InvalidTimeRange(format!(
                "absolute range starts after it ends ({} > {})",
                from.to_rfc3339(),
                to.to_rfc3339()
            )));
        }
        Ok(Self::Absolute { from, to })
    }

    pub fn keyword(keyword: impl Into<String>) -> Result<Self> {
        Self::keyword_in(keyword, None)
    }

    /// Keyword ranges are evaluated in UTC; any other zone is rejected
    /// rather than silently ignored.
    pub fn keyword_in(keyword: impl Into<String>, timezone: Option<String>) -> Result<Self> {
        let keyword = keyword.into();
        parse_keyword(&keyword)?;
        if let Some(tz) = timezone.as_deref() {
            if !matches!(tz, "UTC" | "Etc/UTC" | "Z") {
                return Err(PlanError::InvalidTimeRange(format!(
                    "unsupported timezone '{}'",
                    tz
                )));
            }
        }
        Ok(Self::Keyword { keyword, timezone })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Relative { .. } => "relative",
            Self::Absolute { .. } => "absolute",
            Self::Keyword { .. } => "keyword",
        }
    }

    /// Concrete `(from, to)` bounds relative to `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        match self {
            Self::Relative { range: 0 } => Ok((DateTime::<Utc>::default(), now)),
            Self::Relative { range } => {
                let secs = i64::try_from(*range).map_err(|_| too_wide(i64::MAX))?;
                Ok((shift_back(now, window(secs)?)?, now))
            }
            Self::Absolute { from, to } => Ok((*from, *to)),
            Self::Keyword { keyword, .. } => {
                let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
                Ok(match parse_keyword(keyword)? {
                    Keyword::Today => (midnight, now),
                    Keyword::Yesterday => (shift_back(midnight, Duration::days(1))?, midnight),
                    Keyword::Last(window) => (shift_back(now, window)?, now),
                })
            }
        }
    }
}

fn too_wide(seconds: i64) -> PlanError {
    PlanError::InvalidTimeRange(format!(
        "window of {} seconds exceeds the maximum of {}",
        seconds, MAX_WINDOW_SECONDS
    ))
}

fn window(seconds: i64) -> Result<Duration> {
    if seconds > MAX_WINDOW_SECONDS {
        return Err(too_wide(seconds));
    }
    Duration::try_seconds(seconds).ok_or_else(|| too_wide(seconds))
}

fn shift_back(instant: DateTime<Utc>, by: Duration) -> Result<DateTime<Utc>> {
    instant.checked_sub_signed(by).ok_or_else(|| {
        PlanError::InvalidTimeRange(format!(
            "window reaches before the earliest representable instant ({})",
            instant.to_rfc3339()
        ))
    })
}

enum Keyword {
    Today,
    Yesterday,
    Last(Duration),
}

fn parse_keyword(raw: &str) -> Result<Keyword> {
    let normalized = raw.trim().to_lowercase();
    let invalid = || PlanError::InvalidTimeRange(format!("unrecognized keyword '{}'", raw));

    match normalized.as_str() {
        "today" => return Ok(Keyword::Today),
        "yesterday" => return Ok(Keyword::Yesterday),
        _ => {}
    }

    let mut words = normalized.split_whitespace();
    if words.next() != Some("last") {
        return Err(invalid());
    }
    let (amount, unit) = match (words.next(), words.next(), words.next()) {
        (Some(n), Some(unit), None) => (n.parse::<i64>().map_err(|_| invalid())?, unit),
        // "last hour", "last day"
        (Some(unit), None, None) => (1, unit),
        _ => return Err(invalid()),
    };
    if amount <= 0 {
        return Err(invalid());
    }
    let unit_seconds: i64 = match unit.trim_end_matches('s') {
        "second" => 1,
        "minute" => 60,
        "hour" => 3_600,
        "day" => 86_400,
        "week" => 604_800,
        _ => return Err(invalid()),
    };
    let seconds = amount
        .checked_mul(unit_seconds)
        .ok_or_else(|| too_wide(i64::MAX))?;
    Ok(Keyword::Last(window(seconds)?))
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawTimeRange {
    Relative {
        range: i64,
    },
    Absolute {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    Keyword {
        keyword: String,
        #[serde(default)]
        timezone: Option<String>,
    },
}

impl TryFrom<RawTimeRange> for TimeRange {
    type Error = PlanError;

    fn try_from(raw: RawTimeRange) -> Result<Self> {
        match raw {
            RawTimeRange::Relative { range } => Self::relative(range),
            RawTimeRange::Absolute { from, to } => Self::absolute(from, to),
            RawTimeRange::Keyword { keyword, timezone } => Self::keyword_in(keyword, timezone),
        }
    }
}
