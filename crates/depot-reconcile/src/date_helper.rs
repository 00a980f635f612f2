use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

/// Widest span covered by minute prefixes.
pub const MINUTE_SPAN_LIMIT_MINUTES: i64 = 30;
/// Widest span covered by hour prefixes.
pub const HOUR_SPAN_LIMIT_HOURS: i64 = 24;

/// Size of the time buckets a prefix names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Granularity {
    Minute,
    Hour,
    Day,
}

impl Granularity {
    /// `strftime` pattern of a bucket prefix.
    pub fn format(self) -> &'static str {
        match self {
            Self::Minute => "%Y/%m/%d/%H/%M",
            Self::Hour => "%Y/%m/%d/%H",
            Self::Day => "%Y/%m/%d",
        }
    }

    fn step(self) -> Duration {
        match self {
            Self::Minute => Duration::minutes(1),
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::days(1),
        }
    }

    /// Start of the bucket containing `at`.
    fn truncate(self, at: NaiveDateTime) -> NaiveDateTime {
        let time = match self {
            Self::Minute => NaiveTime::from_hms_opt(at.hour(), at.minute(), 0),
            Self::Hour => NaiveTime::from_hms_opt(at.hour(), 0, 0),
            Self::Day => NaiveTime::from_hms_opt(0, 0, 0),
        };
        at.date().and_time(time.unwrap_or_default())
    }
}

/// Time-bucket prefixes for date-sharded directory layouts.
pub struct DateBasedHelper;

impl DateBasedHelper {
    /// Bucket size used for the span `[from, to]`.
    pub fn granularity(from: NaiveDateTime, to: NaiveDateTime) -> Granularity {
        let span = to - from;
        if span <= Duration::minutes(MINUTE_SPAN_LIMIT_MINUTES) {
            Granularity::Minute
        } else if span <= Duration::hours(HOUR_SPAN_LIMIT_HOURS) {
            Granularity::Hour
        } else {
            Granularity::Day
        }
    }

    /// Every bucket prefix covering `[from, to]`, both ends inclusive, in
    /// ascending order. Empty when `from` is after `to`.
    pub fn generate_prefixes(from: NaiveDateTime, to: NaiveDateTime) -> Vec<String> {
        if from > to {
            return Vec::new();
        }
        let granularity = Self::granularity(from, to);
        let format = granularity.format();
        let step = granularity.step();

        let mut prefixes = Vec::new();
        let mut bucket = granularity.truncate(from);
        while bucket <= to {
            prefixes.push(bucket.format(format).to_string());
            bucket += step;
        }
        prefixes
    }
}
