//! `{{#time:format|date|lang}}`: PHP `date()` style formatting plus the MediaWiki `x…` codes.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("Error: Invalid time.")]
    InvalidTime,
}

impl TimeError {
    pub fn marker(&self) -> String {
        format!("<strong class=\"error\">{self}</strong>")
    }
}

const MONTHS_EN: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];
const MONTHS_DE: [&str; 12] = [
    "Januar", "Februar", "März", "April", "Mai", "Juni", "Juli", "August", "September", "Oktober",
    "November", "Dezember",
];
const MONTH_ABBREVS_EN: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const MONTH_ABBREVS_DE: [&str; 12] = [
    "Jan.", "Feb.", "Mär.", "Apr.", "Mai", "Jun.", "Jul.", "Aug.", "Sep.", "Okt.", "Nov.", "Dez.",
];
const DAYS_EN: [&str; 7] = [
    "Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday",
];
const DAYS_DE: [&str; 7] = [
    "Sonntag", "Montag", "Dienstag", "Mittwoch", "Donnerstag", "Freitag", "Samstag",
];
const DAY_ABBREVS_EN: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const DAY_ABBREVS_DE: [&str; 7] = ["So", "Mo", "Di", "Mi", "Do", "Fr", "Sa"];

/// Full month name, `month` counted from 1.
pub(crate) fn month_name(lang: &str, month: u32) -> &'static str {
    let table = if lang == "de" { &MONTHS_DE } else { &MONTHS_EN };
    table[(month.clamp(1, 12) - 1) as usize]
}

pub(crate) fn month_abbrev(lang: &str, month: u32) -> &'static str {
    let table = if lang == "de" {
        &MONTH_ABBREVS_DE
    } else {
        &MONTH_ABBREVS_EN
    };
    table[(month.clamp(1, 12) - 1) as usize]
}

/// Day name, `weekday` counted from Sunday = 0.
pub(crate) fn day_name(lang: &str, weekday: u32) -> &'static str {
    let table = if lang == "de" { &DAYS_DE } else { &DAYS_EN };
    table[(weekday % 7) as usize]
}

pub(crate) fn day_abbrev(lang: &str, weekday: u32) -> &'static str {
    let table = if lang == "de" {
        &DAY_ABBREVS_DE
    } else {
        &DAY_ABBREVS_EN
    };
    table[(weekday % 7) as usize]
}

fn month_from_name(name: &str) -> Option<u32> {
    let name = name.trim_end_matches('.').to_lowercase();
    if name.len() < 3 {
        return None;
    }
    [&MONTHS_EN, &MONTHS_DE]
        .iter()
        .find_map(|table| {
            table.iter().position(|m| {
                let m = m.to_lowercase();
                m == name || (name.chars().count() == 3 && m.starts_with(&name))
            })
        })
        .map(|i| i as u32 + 1)
}

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[T ](\d{1,2}):(\d{2})(?::(\d{2}))?)?\s*(?:Z|UTC|[+-]00:?00)?$")
        .unwrap()
});
static DOTTED_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})\.\s*(\d{1,2})\.\s*(\d{4})$").unwrap());
static DAY_MONTH_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})\.?\s+(\p{L}+\.?)\s+(\d{4})$").unwrap());
static MONTH_DAY_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\p{L}+\.?)\s+(\d{1,2}),?\s+(\d{4})$").unwrap());
static MONTH_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\p{L}+\.?)\s+(\d{4})$").unwrap());
static TRAILING_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s+(\d{1,2}):(\d{2})(?::(\d{2}))?$").unwrap());
static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.*?)\s*([+-]?\d+)\s*(second|sec|minute|min|hour|day|week|month|year)s?$")
        .unwrap()
});

fn ymd(year: &str, month: u32, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

fn parse_absolute(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let lower = text.to_lowercase();
    match lower.as_str() {
        "" | "now" => return Some(now),
        "today" => return Some(now.date().and_time(NaiveTime::MIN)),
        "tomorrow" => return Some((now.date() + Duration::days(1)).and_time(NaiveTime::MIN)),
        "yesterday" => return Some((now.date() - Duration::days(1)).and_time(NaiveTime::MIN)),
        _ => {}
    }

    if let Some(seconds) = text.strip_prefix('@') {
        return DateTime::from_timestamp(seconds.parse().ok()?, 0).map(|d| d.naive_utc());
    }
    if text.len() == 14 && text.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDateTime::parse_from_str(text, "%Y%m%d%H%M%S").ok();
    }
    if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::from_ymd_opt(text.parse().ok()?, 1, 1).map(|d| d.and_time(NaiveTime::MIN));
    }
    if let Some(caps) = ISO_DATE.captures(text) {
        let date = ymd(&caps[1], caps[2].parse().ok()?, &caps[3])?;
        let time = match (caps.get(4), caps.get(5)) {
            (Some(h), Some(m)) => NaiveTime::from_hms_opt(
                h.as_str().parse().ok()?,
                m.as_str().parse().ok()?,
                caps.get(6).map_or(Some(0), |s| s.as_str().parse().ok())?,
            )?,
            _ => NaiveTime::MIN,
        };
        return Some(date.and_time(time));
    }

    // the remaining formats may carry a trailing "HH:MM[:SS]"
    let (date_part, time) = match TRAILING_TIME.captures(text) {
        Some(caps) => (
            caps.get(1).map_or("", |m| m.as_str()),
            NaiveTime::from_hms_opt(
                caps[2].parse().ok()?,
                caps[3].parse().ok()?,
                caps.get(4).map_or(Some(0), |s| s.as_str().parse().ok())?,
            )?,
        ),
        None => (text, NaiveTime::MIN),
    };

    let date = if let Some(caps) = DOTTED_DATE.captures(date_part) {
        ymd(&caps[3], caps[2].parse().ok()?, &caps[1])?
    } else if let Some(caps) = DAY_MONTH_YEAR.captures(date_part) {
        ymd(&caps[3], month_from_name(&caps[2])?, &caps[1])?
    } else if let Some(caps) = MONTH_DAY_YEAR.captures(date_part) {
        ymd(&caps[3], month_from_name(&caps[1])?, &caps[2])?
    } else if let Some(caps) = MONTH_YEAR.captures(date_part) {
        ymd(&caps[2], month_from_name(&caps[1])?, "1")?
    } else if date_part.is_empty() && time != NaiveTime::MIN {
        now.date()
    } else {
        return None;
    };
    Some(date.and_time(time))
}

/// Parse the date argument of `#time`, relative to `now`.
pub fn parse_date(text: &str, now: DateTime<Utc>) -> Option<NaiveDateTime> {
    let text = text.trim();
    let now = now.naive_utc();

    let Some(caps) = RELATIVE.captures(text) else {
        return parse_absolute(text, now);
    };
    let base = parse_absolute(caps.get(1).map_or("", |m| m.as_str()).trim(), now)?;
    let amount: i64 = caps[2].parse().ok()?;
    let unit = caps[3].to_lowercase();
    match unit.as_str() {
        "second" | "sec" => base.checked_add_signed(Duration::try_seconds(amount)?),
        "minute" | "min" => base.checked_add_signed(Duration::try_minutes(amount)?),
        "hour" => base.checked_add_signed(Duration::try_hours(amount)?),
        "day" => base.checked_add_signed(Duration::try_days(amount)?),
        "week" => base.checked_add_signed(Duration::try_weeks(amount)?),
        "month" | "year" => {
            let months = if unit == "year" { amount.checked_mul(12)? } else { amount };
            let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
            if months >= 0 {
                base.checked_add_months(magnitude)
            } else {
                base.checked_sub_months(magnitude)
            }
        }
        _ => None,
    }
}

fn roman(mut n: i64) -> String {
    if !(1..=3999).contains(&n) {
        return n.to_string();
    }
    const NUMERALS: [(i64, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut result = String::new();
    for (value, numeral) in NUMERALS {
        while n >= value {
            result.push_str(numeral);
            n -= value;
        }
    }
    result
}

fn english_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = (date.year(), date.month());
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.and_then(|n| n.pred_opt()).map_or(31, |d| d.day())
}

fn push_number(out: &mut String, n: i64, width: usize, roman_next: &mut bool) {
    if std::mem::take(roman_next) {
        out.push_str(&roman(n));
    } else {
        out.push_str(&format!("{n:0width$}"));
    }
}

/// Format `date` (or `now` if empty) according to `format`.
pub fn format(format: &str, date: &str, now: DateTime<Utc>, lang: &str) -> Result<String, TimeError> {
    let dt = parse_date(date, now).ok_or(TimeError::InvalidTime)?;
    let mut out = String::new();
    let mut roman_next = false;
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            '"' => {
                let mut literal = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    literal.push(c);
                }
                if !closed {
                    out.push('"');
                }
                out.push_str(&literal);
            }
            'x' => match chars.next() {
                Some('r') => roman_next = true,
                Some('g') => out.push_str(month_name(lang, dt.month())),
                Some('n') | Some('N') => {}
                Some('x') => out.push('x'),
                Some(other) => {
                    out.push('x');
                    out.push(other);
                }
                None => out.push('x'),
            },
            'Y' => push_number(&mut out, dt.year() as i64, 1, &mut roman_next),
            'y' => push_number(&mut out, (dt.year() % 100) as i64, 2, &mut roman_next),
            'o' => push_number(&mut out, dt.iso_week().year() as i64, 1, &mut roman_next),
            'L' => out.push(if NaiveDate::from_ymd_opt(dt.year(), 2, 29).is_some() { '1' } else { '0' }),
            'n' => push_number(&mut out, dt.month() as i64, 1, &mut roman_next),
            'm' => push_number(&mut out, dt.month() as i64, 2, &mut roman_next),
            'M' => out.push_str(month_abbrev(lang, dt.month())),
            'F' => out.push_str(month_name(lang, dt.month())),
            't' => push_number(&mut out, days_in_month(dt.date()) as i64, 1, &mut roman_next),
            'j' => push_number(&mut out, dt.day() as i64, 1, &mut roman_next),
            'd' => push_number(&mut out, dt.day() as i64, 2, &mut roman_next),
            'S' => out.push_str(english_suffix(dt.day())),
            'z' => push_number(&mut out, dt.ordinal0() as i64, 1, &mut roman_next),
            'D' => out.push_str(day_abbrev(lang, dt.weekday().num_days_from_sunday())),
            'l' => out.push_str(day_name(lang, dt.weekday().num_days_from_sunday())),
            'N' => push_number(&mut out, dt.weekday().number_from_monday() as i64, 1, &mut roman_next),
            'w' => push_number(&mut out, dt.weekday().num_days_from_sunday() as i64, 1, &mut roman_next),
            'W' => push_number(&mut out, dt.iso_week().week() as i64, 2, &mut roman_next),
            'a' => out.push_str(if dt.hour() < 12 { "am" } else { "pm" }),
            'A' => out.push_str(if dt.hour() < 12 { "AM" } else { "PM" }),
            'g' => push_number(&mut out, ((dt.hour() + 11) % 12 + 1) as i64, 1, &mut roman_next),
            'h' => push_number(&mut out, ((dt.hour() + 11) % 12 + 1) as i64, 2, &mut roman_next),
            'G' => push_number(&mut out, dt.hour() as i64, 1, &mut roman_next),
            'H' => push_number(&mut out, dt.hour() as i64, 2, &mut roman_next),
            'i' => push_number(&mut out, dt.minute() as i64, 2, &mut roman_next),
            's' => push_number(&mut out, dt.second() as i64, 2, &mut roman_next),
            'U' => push_number(&mut out, dt.and_utc().timestamp(), 1, &mut roman_next),
            'e' | 'T' => out.push_str("UTC"),
            'O' => out.push_str("+0000"),
            'P' => out.push_str("+00:00"),
            'Z' => out.push('0'),
            'c' => out.push_str(&dt.format("%Y-%m-%dT%H:%M:%S+00:00").to_string()),
            'r' => out.push_str(&dt.format("%a, %d %b %Y %H:%M:%S +0000").to_string()),
            other => out.push(other),
        }
    }

    Ok(out)
}
