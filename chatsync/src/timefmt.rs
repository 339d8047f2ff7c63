//! Chat-list timestamps.
//!
//! - same day: `HH:MM`
//! - up to a week ago: weekday name
//! - up to a year ago: `dd.MM`
//! - older: `dd.MM.yyyy`

use chrono::{DateTime, Local, TimeZone, Utc};

use chatsync_proto::message::Timestamp;

/// Formats `at` relative to the current local time.
#[must_use]
pub fn format_chat_time(at: Timestamp) -> String {
    format_chat_time_at(at, &Local::now())
}

/// Formats `at` relative to `now`, in `now`'s time zone.
#[must_use]
pub fn format_chat_time_at<Tz: TimeZone>(at: Timestamp, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let millis = i64::try_from(at.as_millis()).unwrap_or(i64::MAX);
    let Some(utc) = DateTime::<Utc>::from_timestamp_millis(millis) else {
        return String::new();
    };
    let then = utc.with_timezone(&now.timezone());
    let days = (now.date_naive() - then.date_naive()).num_days();

    let pattern = match days {
        0 => "%H:%M",
        1..=7 => "%A",
        8..=365 => "%d.%m",
        _ => "%d.%m.%Y",
    };
    then.format(pattern).to_string()
}
