//! Natural-language date/time arguments.

use anyhow::{Context, Result};
use chrono::{DateTime, Days, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use calsched_core::{EventTime, TimeRange};

const WEEKDAYS_AND_MONTHS: [&str; 19] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Spell out shortened day and month names ("thurs", "sept") for fuzzydate.
fn expand_abbreviations(input: &str) -> String {
    input
        .to_lowercase()
        .split_whitespace()
        .map(|word| {
            let full = (word.len() >= 3)
                .then(|| WEEKDAYS_AND_MONTHS.iter().find(|name| name.starts_with(word)))
                .flatten();
            full.copied().unwrap_or(word)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A clock reading: `9am`, `15:00`, `3:30pm`, or a bare hour after "at".
fn is_clock_time(word: &str, previous: Option<&str>) -> bool {
    let (number, meridiem) = match word.strip_suffix("am").or_else(|| word.strip_suffix("pm")) {
        Some(number) => (number, true),
        None => (word, false),
    };
    let numeric = number.chars().any(|c| c.is_ascii_digit())
        && number.chars().all(|c| c.is_ascii_digit() || c == ':');
    numeric && (meridiem || number.contains(':') || previous == Some("at"))
}

/// Whether the input names a time of day; without one the meeting is all-day.
fn has_time_of_day(input: &str) -> bool {
    let lower = input.to_lowercase();
    let words: Vec<&str> = lower
        .split_whitespace()
        .map(|w| w.trim_matches(','))
        .collect();

    words.iter().enumerate().any(|(i, word)| {
        let previous = i.checked_sub(1).map(|j| words[j]);
        match *word {
            "noon" | "midnight" => true,
            "am" | "pm" => previous.is_some_and(|p| is_clock_time(&format!("{}{}", p, word), None)),
            _ => is_clock_time(word, previous),
        }
    })
}

/// The local timezone, falling back to UTC when it can't be determined.
fn local_timezone() -> Tz {
    iana_time_zone::get_timezone()
        .ok()
        .and_then(|name| name.parse().ok())
        .unwrap_or(Tz::UTC)
}

fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("{} does not exist in {}", naive, tz))
}

/// Parse a natural language date/time string into an EventTime.
///
/// Inputs with a time of day are read in the local timezone and sent as
/// UTC, since attendees may be anywhere. Everything else is all-day.
pub fn parse_datetime(input: &str) -> Result<EventTime> {
    parse_datetime_in(input, local_timezone())
}

fn parse_datetime_in(input: &str, tz: Tz) -> Result<EventTime> {
    let expanded = expand_abbreviations(input);
    let dt = fuzzydate::parse(&expanded)
        .map_err(|_| anyhow::anyhow!("Could not parse date/time: \"{}\"", input))?;

    if has_time_of_day(input) {
        Ok(EventTime::DateTimeUtc(local_to_utc(dt, tz)?))
    } else {
        Ok(EventTime::Date(dt.date()))
    }
}

/// Move a start time forward, keeping its kind. All-day times move by whole days.
fn shift(time: &EventTime, by: Duration) -> Option<EventTime> {
    Some(match time {
        EventTime::Date(d) => {
            EventTime::Date(d.checked_add_days(Days::new(by.num_days().unsigned_abs()))?)
        }
        EventTime::DateTimeFloating(dt) => EventTime::DateTimeFloating(dt.checked_add_signed(by)?),
        EventTime::DateTimeUtc(dt) => EventTime::DateTimeUtc(dt.checked_add_signed(by)?),
        EventTime::DateTimeZoned { datetime, tzid } => EventTime::DateTimeZoned {
            datetime: datetime.checked_add_signed(by)?,
            tzid: tzid.clone(),
        },
    })
}

fn apply_duration(start: &EventTime, dur_input: &str) -> Result<EventTime> {
    let std_dur = humantime::parse_duration(dur_input)
        .with_context(|| format!("Could not parse duration: \"{}\"", dur_input))?;
    Duration::from_std(std_dur)
        .ok()
        .and_then(|by| shift(start, by))
        .with_context(|| format!("Duration \"{}\" is too long", dur_input))
}

/// Default end time: +1 hour for timed events, +1 day for all-day events.
fn default_end(start: &EventTime) -> Result<EventTime> {
    let by = match start {
        EventTime::Date(_) => Duration::days(1),
        _ => Duration::hours(1),
    };
    shift(start, by).with_context(|| format!("No time after {}", start))
}

/// Start and end of a meeting from `--start` and either `--end` or `--duration`.
pub fn meeting_times(
    start: &str,
    end: Option<&str>,
    duration: Option<&str>,
) -> Result<(EventTime, EventTime)> {
    let start = parse_datetime(start)?;
    let end = match (end, duration) {
        (Some(end), _) => parse_datetime(end)?,
        (None, Some(duration)) => apply_duration(&start, duration)?,
        (None, None) => default_end(&start)?,
    };

    if let (Some(s), Some(e)) = (start.to_utc(), end.to_utc())
        && e <= s
    {
        anyhow::bail!("The meeting must end after it starts ({} - {})", start, end);
    }
    Ok((start, end))
}

/// A free/busy window from `--from` and `--to`.
pub fn parse_range(from: &str, to: &str) -> Result<TimeRange> {
    let start = parse_datetime(from)?
        .to_utc()
        .context("Could not resolve --from to an instant")?;
    let end = parse_datetime(to)?
        .to_utc()
        .context("Could not resolve --to to an instant")?;
    Ok(TimeRange::new(start, end)?)
}
