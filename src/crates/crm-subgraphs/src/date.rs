//! Resolves a free-text date/time phrase into a concrete UTC interval.
//!
//! `crm_planner::entities` recognizes that a query *contains* a date phrase;
//! this module is the next step the calendar subgraph needs — turning that
//! phrase into the `{start, end, hasTime}` triple `fetch_appointments` and
//! `check_conflicts` actually operate on. Built on the same regex vocabulary
//! `crm-planner` already uses for date/duration extraction, widened from
//! detection into resolution.
//!
//! Timezone handling is deliberately simple: `reference` is the caller's
//! "now" already expressed as a `DateTime<Utc>`, and day boundaries are
//! computed against it directly rather than through an IANA timezone
//! database. A deployment that needs wall-clock-local day boundaries passes
//! in a `reference` already shifted by its offset; full per-timezone
//! calendars are out of scope for this crate (see DESIGN.md).

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use std::sync::OnceLock;

/// A resolved date/time phrase, ready to become an `AppointmentFilter` or the
/// `start_time`/`end_time` half of an `AppointmentSpec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Whether the phrase carried an explicit clock time ("8am") rather than
    /// only a day ("tomorrow"). Nodes use this to decide whether a
    /// business-hours default still needs to be applied.
    pub has_time: bool,
}

/// Business day bounds applied when a phrase names a day but no time (§9
/// Design Notes: "business-hours default on ambiguous date-only input is a
/// policy choice"). This deployment defaults to a 9am-5pm window.
const BUSINESS_START_HOUR: u32 = 9;
const BUSINESS_END_HOUR: u32 = 17;
const DEFAULT_MEETING_MINUTES: i64 = 60;

fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive)).unwrap_or(at)
}

fn business_window(day: DateTime<Utc>) -> DateQuery {
    let day = start_of_day(day);
    DateQuery {
        start: day + Duration::hours(BUSINESS_START_HOUR as i64),
        end: day + Duration::hours(BUSINESS_END_HOUR as i64),
        has_time: false,
    }
}

fn week_window(reference_monday: DateTime<Utc>) -> DateQuery {
    let monday = start_of_day(reference_monday);
    DateQuery {
        start: monday,
        end: monday + Duration::days(7),
        has_time: false,
    }
}

fn monday_of(at: DateTime<Utc>) -> DateTime<Utc> {
    let offset = at.weekday().num_days_from_monday();
    start_of_day(at) - Duration::days(offset as i64)
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name.to_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Next occurrence of `weekday` on or after `reference`'s day (today counts
/// if it already is that weekday).
fn next_weekday(reference: DateTime<Utc>, weekday: Weekday) -> DateTime<Utc> {
    let today = start_of_day(reference);
    let current = today.weekday().num_days_from_monday() as i64;
    let target = weekday.num_days_from_monday() as i64;
    let delta = (target - current).rem_euclid(7);
    today + Duration::days(delta)
}

fn explicit_time_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s?(am|pm)\b").expect("valid regex"))
}

fn duration_minutes_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"(?i)\b(\d+)\s?(minutes?|mins?|hours?|hrs?)\b").expect("valid regex")
    })
}

fn parse_explicit_time(text: &str) -> Option<NaiveTime> {
    let caps = explicit_time_regex().captures(text)?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
    let is_pm = caps[3].eq_ignore_ascii_case("pm");
    if hour == 12 {
        hour = 0;
    }
    if is_pm {
        hour += 12;
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn parse_duration(text: &str) -> Option<Duration> {
    let caps = duration_minutes_regex().captures(text)?;
    let amount: i64 = caps[1].parse().ok()?;
    let unit = caps[2].to_lowercase();
    if unit.starts_with("hour") || unit.starts_with("hr") {
        Some(Duration::hours(amount))
    } else {
        Some(Duration::minutes(amount))
    }
}

/// Resolve a free-text phrase against `reference` ("now", already in the
/// timezone the caller wants day boundaries computed in). Returns `None` when
/// the phrase carries no recognizable date signal at all — callers fall back
/// to treating the request as date-unqualified.
pub fn parse_date_query(text: &str, reference: DateTime<Utc>) -> Option<DateQuery> {
    let lower = text.to_lowercase();

    let mut day = if lower.contains("today") {
        Some(start_of_day(reference))
    } else if lower.contains("tomorrow") {
        Some(start_of_day(reference) + Duration::days(1))
    } else if lower.contains("yesterday") {
        Some(start_of_day(reference) - Duration::days(1))
    } else if lower.contains("next week") {
        return Some(week_window(monday_of(reference) + Duration::days(7)));
    } else if lower.contains("this week") {
        return Some(week_window(monday_of(reference)));
    } else {
        None
    };

    if day.is_none() {
        for (name, weekday) in [
            ("monday", Weekday::Mon),
            ("tuesday", Weekday::Tue),
            ("wednesday", Weekday::Wed),
            ("thursday", Weekday::Thu),
            ("friday", Weekday::Fri),
            ("saturday", Weekday::Sat),
            ("sunday", Weekday::Sun),
        ] {
            if lower.contains(name) {
                day = Some(next_weekday(reference, weekday_from_name(name).unwrap_or(weekday)));
                break;
            }
        }
    }

    let explicit_time = parse_explicit_time(&lower);

    match (day, explicit_time) {
        (Some(day), Some(time)) => {
            let start = Utc.from_utc_datetime(&day.date_naive().and_time(time));
            let length = parse_duration(&lower).unwrap_or(Duration::minutes(DEFAULT_MEETING_MINUTES));
            Some(DateQuery {
                start,
                end: start + length,
                has_time: true,
            })
        }
        (Some(day), None) => Some(business_window(day)),
        (None, Some(time)) => {
            // A bare time with no day qualifier ("at 8am") is taken to mean
            // today, or tomorrow if that time has already passed.
            let today_start = Utc.from_utc_datetime(&start_of_day(reference).date_naive().and_time(time));
            let start = if today_start < reference { today_start + Duration::days(1) } else { today_start };
            let length = parse_duration(&lower).unwrap_or(Duration::minutes(DEFAULT_MEETING_MINUTES));
            Some(DateQuery {
                start,
                end: start + length,
                has_time: true,
            })
        }
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn reference() -> DateTime<Utc> {
        // A Wednesday.
        Utc.from_utc_datetime(&NaiveDate::from_ymd_opt(2026, 7, 22).unwrap().and_hms_opt(10, 0, 0).unwrap())
    }

    #[test]
    fn today_resolves_to_business_hours_window() {
        let q = parse_date_query("what's on my calendar today", reference()).unwrap();
        assert!(!q.has_time);
        assert_eq!(q.start.hour(), BUSINESS_START_HOUR);
        assert_eq!(q.end.hour(), BUSINESS_END_HOUR);
        assert_eq!(q.start.date_naive(), reference().date_naive());
    }

    #[test]
    fn tomorrow_at_explicit_time_has_time_true() {
        let q = parse_date_query("schedule a sync tomorrow at 8am", reference()).unwrap();
        assert!(q.has_time);
        assert_eq!(q.start.date_naive(), reference().date_naive() + Duration::days(1));
        assert_eq!(q.start.hour(), 8);
        assert_eq!(q.end - q.start, Duration::minutes(DEFAULT_MEETING_MINUTES));
    }

    #[test]
    fn explicit_duration_overrides_default_length() {
        let q = parse_date_query("meet tomorrow at 2pm for 30 minutes", reference()).unwrap();
        assert_eq!(q.end - q.start, Duration::minutes(30));
    }

    #[test]
    fn next_week_spans_seven_days_from_monday() {
        let q = parse_date_query("what's on my calendar next week", reference()).unwrap();
        assert_eq!(q.end - q.start, Duration::days(7));
        assert_eq!(q.start.weekday(), Weekday::Mon);
    }

    #[test]
    fn weekday_name_resolves_to_upcoming_occurrence() {
        let q = parse_date_query("schedule it for friday", reference()).unwrap();
        assert_eq!(q.start.weekday(), Weekday::Fri);
        assert!(q.start >= start_of_day(reference()));
    }

    #[test]
    fn unrecognized_phrase_returns_none() {
        assert!(parse_date_query("send the quarterly report", reference()).is_none());
    }

    #[test]
    fn bare_time_before_now_rolls_to_tomorrow() {
        let q = parse_date_query("call me at 9am", reference()).unwrap();
        assert_eq!(q.start.date_naive(), reference().date_naive() + Duration::days(1));
    }
}
