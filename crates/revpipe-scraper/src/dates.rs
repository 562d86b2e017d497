//! Review date recognition.
//!
//! Each platform formats dates differently: Instashop emits US-style local
//! timestamps, Talabat emits calendar dates without a time, Elmenus emits
//! ISO-8601 and Mrsool emits Arabic relative phrases ("منذ ٣ ساعات").
//! Everything is normalized to UTC.

use std::sync::LazyLock;

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};
use regex::Regex;
use revpipe_core::SourceKind;

/// How a platform writes its review dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStyle {
    Talabat,
    Instashop,
    Elmenus,
    Mrsool,
}

impl From<SourceKind> for DateStyle {
    fn from(source: SourceKind) -> Self {
        match source {
            SourceKind::Talabat => DateStyle::Talabat,
            SourceKind::Instashop => DateStyle::Instashop,
        }
    }
}

impl DateStyle {
    /// Offset naive timestamps from this platform are written in.
    fn local_offset(self) -> FixedOffset {
        let secs = match self {
            DateStyle::Talabat | DateStyle::Instashop => 2 * 3600,
            DateStyle::Elmenus | DateStyle::Mrsool => 0,
        };
        FixedOffset::east_opt(secs).unwrap_or_else(|| Utc.fix())
    }

    fn datetime_formats(self) -> &'static [&'static str] {
        match self {
            DateStyle::Instashop => &[
                "%m/%d/%Y, %I:%M:%S %p",
                "%m/%d/%Y, %H:%M:%S",
                "%Y-%m-%d %H:%M:%S",
                "%Y-%m-%dT%H:%M:%S",
            ],
            DateStyle::Talabat | DateStyle::Elmenus | DateStyle::Mrsool => &[],
        }
    }

    fn date_formats(self) -> &'static [&'static str] {
        match self {
            // %B also accepts the abbreviated month name when parsing.
            DateStyle::Talabat => &["%d %B %Y", "%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"],
            DateStyle::Instashop | DateStyle::Elmenus | DateStyle::Mrsool => &[],
        }
    }

    fn uses_relative_phrases(self) -> bool {
        matches!(self, DateStyle::Mrsool)
    }
}

/// A recognized review date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecognizedDate {
    pub instant: DateTime<Utc>,
    /// A Talabat calendar date without a time of day; `instant` is midnight
    /// UTC. Date-only values from other platforms are localized midnights
    /// and compared like any timestamp.
    pub date_only: bool,
}

impl RecognizedDate {
    /// Timestamps are recent when no older than 24 hours. Talabat calendar
    /// dates cannot be compared that precisely and count as recent when they
    /// fall on today or yesterday (UTC).
    #[must_use]
    pub fn is_within_last_24h(&self, now: DateTime<Utc>) -> bool {
        if self.date_only {
            let today = now.date_naive();
            let day = self.instant.date_naive();
            return match today.pred_opt() {
                Some(yesterday) => day >= yesterday,
                None => day >= today,
            };
        }
        self.instant >= now - Duration::hours(24)
    }
}

const GENERAL_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
    "%d %B %Y %H:%M",
];

const GENERAL_OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

const GENERAL_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d %B %Y", "%B %d, %Y"];

/// Parse `text` as written by a platform using `style`.
///
/// `now` anchors relative phrases. Returns `None` when nothing matches.
#[must_use]
pub fn parse(text: &str, style: DateStyle, now: DateTime<Utc>) -> Option<RecognizedDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    parse_exact(text, style)
        .or_else(|| parse_general(text, style))
        .or_else(|| {
            if style.uses_relative_phrases() {
                parse_relative(text, now)
            } else {
                None
            }
        })
}

/// Whether `text` denotes a moment within the 24 hours before `now`.
/// Missing or unparseable text is never recent.
#[must_use]
pub fn is_within_last_24h(text: Option<&str>, style: DateStyle, now: DateTime<Utc>) -> bool {
    let Some(raw) = text else {
        return false;
    };
    match parse(raw, style, now) {
        Some(date) => date.is_within_last_24h(now),
        None => {
            tracing::info!(text = raw, ?style, "dates: could not parse review date");
            false
        }
    }
}

fn localize(naive: NaiveDateTime, style: DateStyle) -> Option<DateTime<Utc>> {
    style
        .local_offset()
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn date_only(date: NaiveDate, style: DateStyle) -> Option<RecognizedDate> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    if style == DateStyle::Talabat {
        return Some(RecognizedDate {
            instant: midnight.and_utc(),
            date_only: true,
        });
    }
    localize(midnight, style).map(|instant| RecognizedDate {
        instant,
        date_only: false,
    })
}

fn parse_exact(text: &str, style: DateStyle) -> Option<RecognizedDate> {
    for fmt in style.datetime_formats() {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return localize(naive, style).map(|instant| RecognizedDate {
                instant,
                date_only: false,
            });
        }
    }
    for fmt in style.date_formats() {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return date_only(date, style);
        }
    }
    None
}

fn parse_general(text: &str, style: DateStyle) -> Option<RecognizedDate> {
    let exact = |instant: DateTime<Utc>| RecognizedDate {
        instant,
        date_only: false,
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(exact(dt.with_timezone(&Utc)));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(exact(dt.with_timezone(&Utc)));
    }
    for fmt in GENERAL_OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(exact(dt.with_timezone(&Utc)));
        }
    }
    for fmt in GENERAL_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return localize(naive, style).map(exact);
        }
    }
    for fmt in GENERAL_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return date_only(date, style);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Arabic relative phrases
// ---------------------------------------------------------------------------

const HOUR_WORDS: &[&str] = &["ساعة", "ساعات", "ساعه", "ساعتين"];
const MINUTE_WORDS: &[&str] = &["دقيقة", "دقائق", "دقيقه", "دقايق"];
const SECOND_WORDS: &[&str] = &["ثانية", "ثواني", "ثانيه", "ثوانى"];
const DAY_WORDS: &[&str] = &["يوم", "أيام", "ايام", "يومين"];

/// Dual forms ("two hours", "two days") that carry their own count.
const DUAL_WORDS: &[&str] = &["ساعتين", "يومين"];

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9\x{0660}-\x{0669}\x{06F0}-\x{06F9}]+").expect("valid number regex")
});

fn digit_value(c: char) -> Option<u32> {
    match c {
        '0'..='9' => c.to_digit(10),
        '\u{0660}'..='\u{0669}' => Some(u32::from(c) - 0x0660),
        '\u{06F0}'..='\u{06F9}' => Some(u32::from(c) - 0x06F0),
        _ => None,
    }
}

fn phrase_count(text: &str) -> i64 {
    if let Some(m) = NUMBER_RE.find(text) {
        let mut value: i64 = 0;
        for c in m.as_str().chars() {
            let Some(d) = digit_value(c) else { continue };
            value = value.saturating_mul(10).saturating_add(i64::from(d));
        }
        return value;
    }
    if DUAL_WORDS.iter().any(|w| text.contains(w)) {
        return 2;
    }
    1
}

fn parse_relative(text: &str, now: DateTime<Utc>) -> Option<RecognizedDate> {
    let contains_any = |words: &[&str]| words.iter().any(|w| text.contains(w));

    let unit_secs: i64 = if contains_any(SECOND_WORDS) {
        1
    } else if contains_any(MINUTE_WORDS) {
        60
    } else if contains_any(HOUR_WORDS) {
        3600
    } else if contains_any(DAY_WORDS) {
        86_400
    } else {
        return None;
    };

    let secs = phrase_count(text).checked_mul(unit_secs)?;
    let offset = Duration::try_seconds(secs)?;
    now.checked_sub_signed(offset).map(|instant| RecognizedDate {
        instant,
        date_only: false,
    })
}

#[cfg(test)]
#[path = "dates_test.rs"]
mod tests;
