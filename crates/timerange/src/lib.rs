/// Minute/second spans attached to scene content and storyboard shots
///
/// The backend emits `MM:SS-MM:SS`; the editors show and accept the primed
/// `MM:SS'-MM:SS'` form. Both parse to the same [`TimeRange`].
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest minute/second field value; larger inputs are clamped, never wrapped.
pub const MAX_FIELD: u32 = 59;

/// Largest representable instant: 59:59.999
pub const MAX_MILLIS: u64 = 3_599_999;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeRangeError {
    #[error("time range is empty")]
    Empty,
    #[error("malformed time range '{input}': {reason}")]
    Malformed { input: String, reason: &'static str },
    #[error("end {end} must be after start {start}")]
    EndNotAfterStart { start: TimePoint, end: TimePoint },
}

impl TimeRangeError {
    /// True when the text could not be read at all, as opposed to a
    /// well-formed range whose end is not after its start.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Empty | Self::Malformed { .. })
    }
}

/// One instant inside a scene, under an hour long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimePoint {
    pub minutes: u32,
    pub seconds: u32,
    #[serde(default)]
    pub millis: u32,
}

impl TimePoint {
    pub const ZERO: TimePoint = TimePoint {
        minutes: 0,
        seconds: 0,
        millis: 0,
    };

    /// Build from minute/second fields, clamping each to `[0, 59]`.
    pub fn new(minutes: u32, seconds: u32) -> Self {
        Self {
            minutes: minutes.min(MAX_FIELD),
            seconds: seconds.min(MAX_FIELD),
            millis: 0,
        }
    }

    pub fn with_millis(mut self, millis: u32) -> Self {
        self.millis = millis.min(999);
        self
    }

    pub fn to_millis(&self) -> u64 {
        (self.minutes as u64 * 60 + self.seconds as u64) * 1000 + self.millis as u64
    }

    /// Inverse of [`TimePoint::to_millis`] on `[0, MAX_MILLIS]`; larger values saturate.
    pub fn from_millis(ms: u64) -> Self {
        let ms = ms.min(MAX_MILLIS);
        let total_seconds = ms / 1000;
        Self {
            minutes: (total_seconds / 60) as u32,
            seconds: (total_seconds % 60) as u32,
            millis: (ms % 1000) as u32,
        }
    }

    fn parse_field(input: &str, raw: &str) -> Result<u32, TimeRangeError> {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > 3 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TimeRangeError::Malformed {
                input: input.to_string(),
                reason: "fields must be 1-3 digits",
            });
        }
        raw.parse::<u32>().map_err(|_| TimeRangeError::Malformed {
            input: input.to_string(),
            reason: "field is not a number",
        })
    }

    fn parse_side(input: &str, side: &str) -> Result<Self, TimeRangeError> {
        let side = side.trim();
        let side = side
            .strip_suffix('\'')
            .or_else(|| side.strip_suffix('\u{2032}'))
            .unwrap_or(side);
        let mut parts = side.split(':');
        let (Some(min), Some(sec), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(TimeRangeError::Malformed {
                input: input.to_string(),
                reason: "expected MM:SS on each side",
            });
        };
        Ok(Self::new(
            Self::parse_field(input, min)?,
            Self::parse_field(input, sec)?,
        ))
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes, self.seconds)
    }
}

/// Start/end pair as edited on a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: TimePoint,
    pub end: TimePoint,
}

impl TimeRange {
    pub fn new(start: TimePoint, end: TimePoint) -> Self {
        Self { start, end }
    }

    pub fn from_millis(start_ms: u64, end_ms: u64) -> Self {
        Self {
            start: TimePoint::from_millis(start_ms),
            end: TimePoint::from_millis(end_ms),
        }
    }

    /// Structural parse of either textual form. Ordering is not checked here;
    /// see [`TimeRange::validate`] and [`TimeRange::parse_valid`].
    pub fn parse(input: &str) -> Result<Self, TimeRangeError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(TimeRangeError::Empty);
        }
        let separators = text.matches(['-', '\u{2013}']).count();
        if separators != 1 {
            return Err(TimeRangeError::Malformed {
                input: input.to_string(),
                reason: "expected exactly one '-' between start and end",
            });
        }
        let (start, end) = text
            .split_once(['-', '\u{2013}'])
            .ok_or_else(|| TimeRangeError::Malformed {
                input: input.to_string(),
                reason: "missing separator",
            })?;
        Ok(Self {
            start: TimePoint::parse_side(input, start)?,
            end: TimePoint::parse_side(input, end)?,
        })
    }

    pub fn parse_valid(input: &str) -> Result<Self, TimeRangeError> {
        let range = Self::parse(input)?;
        range.validate()?;
        Ok(range)
    }

    /// Rejects ranges whose end is not strictly after the start.
    pub fn validate(&self) -> Result<(), TimeRangeError> {
        if self.start.to_millis() >= self.end.to_millis() {
            return Err(TimeRangeError::EndNotAfterStart {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    pub fn start_ms(&self) -> u64 {
        self.start.to_millis()
    }

    pub fn end_ms(&self) -> u64 {
        self.end.to_millis()
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms().saturating_sub(self.start_ms())
    }

    /// Display form: `MM:SS'-MM:SS'`
    pub fn format(&self) -> String {
        format!("{}'-{}'", self.start, self.end)
    }

    /// Wire form: `MM:SS-MM:SS`
    pub fn format_plain(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl FromStr for TimeRange {
    type Err = TimeRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_forms_parse_equal() {
        let plain = TimeRange::parse("01:05-02:30").unwrap();
        let primed = TimeRange::parse("01:05'-02:30'").unwrap();
        assert_eq!(plain, primed);
        assert_eq!(plain.start, TimePoint::new(1, 5));
        assert_eq!(plain.end, TimePoint::new(2, 30));
    }

    #[test]
    fn test_format_zero_pads_primed() {
        let range = TimeRange::new(TimePoint::new(0, 5), TimePoint::new(3, 9));
        assert_eq!(range.format(), "00:05'-03:09'");
        assert_eq!(range.format_plain(), "00:05-03:09");
        assert_eq!(range.to_string(), "00:05'-03:09'");
    }

    #[test]
    fn test_format_reparses() {
        let range = TimeRange::parse("0:7 - 1:2").unwrap();
        assert_eq!(TimeRange::parse(&range.format()).unwrap(), range);
    }

    #[test]
    fn test_millis_round_trip_full_hour() {
        for ms in 0..=MAX_MILLIS {
            assert_eq!(TimePoint::from_millis(ms).to_millis(), ms);
        }
    }

    #[test]
    fn test_fields_clamp_instead_of_wrapping() {
        let point = TimePoint::new(75, 61);
        assert_eq!(point.minutes, 59);
        assert_eq!(point.seconds, 59);

        let range = TimeRange::parse("00:99-120:00").unwrap();
        assert_eq!(range.start, TimePoint::new(0, 59));
        assert_eq!(range.end, TimePoint::new(59, 0));
        assert_eq!(TimePoint::from_millis(u64::MAX).to_millis(), MAX_MILLIS);
    }

    #[test]
    fn test_invalid_order_distinct_from_malformed() {
        let backwards = TimeRange::parse("00:10-00:05").unwrap();
        let err = backwards.validate().unwrap_err();
        assert!(matches!(err, TimeRangeError::EndNotAfterStart { .. }));
        assert!(!err.is_malformed());

        let err = TimeRange::parse("0a:10-00:20").unwrap_err();
        assert!(matches!(err, TimeRangeError::Malformed { .. }));
        assert!(err.is_malformed());
    }

    #[test]
    fn test_equal_endpoints_rejected() {
        assert!(TimeRange::parse_valid("00:10-00:10").is_err());
        assert!(TimeRange::from_millis(5_000, 5_000).validate().is_err());
        assert!(TimeRange::from_millis(5_000, 5_001).validate().is_ok());
    }

    #[test]
    fn test_malformed_inputs() {
        for bad in ["", "   ", "00:10", "00:10-00:20-00:30", "10-20", "00:10:00-00:20", "-00:20"] {
            assert!(TimeRange::parse(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_en_dash_separator() {
        let range = TimeRange::parse_valid("00:01\u{2013}00:04").unwrap();
        assert_eq!(range.duration_ms(), 3_000);
    }

    #[test]
    fn test_serde_shape() {
        let range = TimeRange::from_millis(1_500, 61_000);
        let json = serde_json::to_value(range).unwrap();
        assert_eq!(json["start"]["seconds"], 1);
        assert_eq!(json["start"]["millis"], 500);
        assert_eq!(json["end"]["minutes"], 1);
    }
}
