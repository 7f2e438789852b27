//! Raw browser timestamps to calendar time
//!
//! The encoding of a timestamp column is a property of the data source, so
//! it is looked up from `(family, column)` instead of guessed from the value.

use crate::browsers::Family;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

/// Seconds between 1601-01-01 and 1970-01-01
const WEBKIT_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeEncoding {
    /// Microseconds since 1601-01-01 (Chromium)
    WebkitMicros,
    UnixSeconds,
    UnixMillis,
    UnixMicros,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeColumn {
    LoginCreated,
    CookieCreated,
    CookieExpires,
    LastVisit,
    DownloadStart,
    DownloadEnd,
    BookmarkAdded,
}

pub fn encoding_for(family: Family, column: TimeColumn) -> TimeEncoding {
    match (family, column) {
        (Family::Webkit, _) => TimeEncoding::WebkitMicros,
        (Family::Gecko, TimeColumn::CookieExpires) => TimeEncoding::UnixSeconds,
        (Family::Gecko, TimeColumn::LoginCreated) => TimeEncoding::UnixMillis,
        // endTime inside the download annotation JSON
        (Family::Gecko, TimeColumn::DownloadEnd) => TimeEncoding::UnixMillis,
        (Family::Gecko, _) => TimeEncoding::UnixMicros,
    }
}

impl TimeEncoding {
    /// `None` for zero, negative or unrepresentable values.
    pub fn to_datetime(self, raw: i64) -> Option<DateTime<Utc>> {
        if raw <= 0 {
            return None;
        }
        let (secs, nanos) = match self {
            TimeEncoding::WebkitMicros => (
                (raw / 1_000_000).checked_sub(WEBKIT_EPOCH_OFFSET_SECS)?,
                (raw % 1_000_000) * 1_000,
            ),
            TimeEncoding::UnixSeconds => (raw, 0),
            TimeEncoding::UnixMillis => (raw / 1_000, (raw % 1_000) * 1_000_000),
            TimeEncoding::UnixMicros => (raw / 1_000_000, (raw % 1_000_000) * 1_000),
        };
        if secs < 0 {
            return None;
        }
        Utc.timestamp_opt(secs, nanos as u32).single()
    }
}

/// Normalize one timestamp column value.
pub fn normalize(family: Family, column: TimeColumn, raw: i64) -> Option<DateTime<Utc>> {
    encoding_for(family, column).to_datetime(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_webkit_micros() {
        let dt = TimeEncoding::WebkitMicros.to_datetime(13_260_000_000_000_000).unwrap();
        assert_eq!(dt.year(), 2021);
    }

    #[test]
    fn test_unix_seconds() {
        let dt = TimeEncoding::UnixSeconds.to_datetime(1_609_459_200).unwrap();
        assert_eq!(dt.to_rfc3339(), "2021-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_unix_millis_and_micros() {
        let ms = TimeEncoding::UnixMillis.to_datetime(1_609_459_200_500).unwrap();
        assert_eq!(ms.timestamp_millis(), 1_609_459_200_500);
        let us = TimeEncoding::UnixMicros.to_datetime(1_609_459_200_000_001).unwrap();
        assert_eq!(us.timestamp_micros(), 1_609_459_200_000_001);
    }

    #[test]
    fn test_zero_is_none() {
        assert!(TimeEncoding::WebkitMicros.to_datetime(0).is_none());
        assert!(TimeEncoding::UnixSeconds.to_datetime(-5).is_none());
        // before 1970 in Webkit terms
        assert!(TimeEncoding::WebkitMicros.to_datetime(1_000).is_none());
        assert!(TimeEncoding::UnixSeconds.to_datetime(i64::MAX).is_none());
    }

    #[test]
    fn test_static_resolution() {
        assert_eq!(encoding_for(Family::Webkit, TimeColumn::CookieExpires), TimeEncoding::WebkitMicros);
        assert_eq!(encoding_for(Family::Gecko, TimeColumn::CookieExpires), TimeEncoding::UnixSeconds);
        assert_eq!(encoding_for(Family::Gecko, TimeColumn::LoginCreated), TimeEncoding::UnixMillis);
        assert_eq!(encoding_for(Family::Gecko, TimeColumn::LastVisit), TimeEncoding::UnixMicros);
    }
}
